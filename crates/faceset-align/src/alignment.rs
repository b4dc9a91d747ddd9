//! Five-point similarity alignment of RGB face crops.

use image::{Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 crop:
/// left eye, right eye, nose, left mouth corner, right mouth corner.
pub const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

const REFERENCE_SIZE: f32 = 112.0;

/// 4-DOF similarity transform `dst = [a -b; b a] * src + [tx; ty]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (self.a * x - self.b * y + self.tx, self.b * x + self.a * y + self.ty)
    }

    /// Inverse mapping, or `None` for a degenerate (zero-scale) transform.
    pub fn inverse(&self) -> Option<Similarity> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let a = self.a / det;
        let b = -self.b / det;
        Some(Similarity {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}

/// Reference landmarks scaled to a `size`×`size` crop.
pub fn reference_landmarks(size: u32) -> [(f32, f32); 5] {
    let scale = size as f32 / REFERENCE_SIZE;
    REFERENCE_LANDMARKS_112.map(|(x, y)| (x * scale, y * scale))
}

/// Closed-form least-squares similarity from `src` to `dst` point sets.
pub fn estimate_similarity(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Similarity {
    let n = src.len() as f32;
    let mean = |pts: &[(f32, f32); 5]| {
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
        (sx / n, sy / n)
    };
    let (msx, msy) = mean(src);
    let (mdx, mdy) = mean(dst);

    let mut dot = 0.0f32;
    let mut cross = 0.0f32;
    let mut norm = 0.0f32;
    for ((sx, sy), (dx, dy)) in src.iter().zip(dst.iter()) {
        let (sx, sy) = (sx - msx, sy - msy);
        let (dx, dy) = (dx - mdx, dy - mdy);
        dot += sx * dx + sy * dy;
        cross += sx * dy - sy * dx;
        norm += sx * sx + sy * sy;
    }

    if norm < 1e-12 {
        return Similarity {
            a: 1.0,
            b: 0.0,
            tx: mdx - msx,
            ty: mdy - msy,
        };
    }

    let a = dot / norm;
    let b = cross / norm;
    Similarity {
        a,
        b,
        tx: mdx - (a * msx - b * msy),
        ty: mdy - (b * msx + a * msy),
    }
}

/// Warp `image` through `transform` into a `size`×`size` crop using
/// bilinear sampling. Pixels that map outside the source are black.
pub fn warp_rgb(image: &RgbImage, transform: &Similarity, size: u32) -> RgbImage {
    let mut out = RgbImage::new(size, size);
    let Some(inv) = transform.inverse() else {
        return out;
    };
    let (w, h) = (image.width() as i64, image.height() as i64);

    let sample = |x: i64, y: i64, c: usize| -> f32 {
        if x >= 0 && x < w && y >= 0 && y < h {
            image.get_pixel(x as u32, y as u32).0[c] as f32
        } else {
            0.0
        }
    };

    for (ox, oy, pixel) in out.enumerate_pixels_mut() {
        let (sx, sy) = inv.apply((ox as f32, oy as f32));
        let x0 = sx.floor() as i64;
        let y0 = sy.floor() as i64;
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let mut rgb = [0u8; 3];
        for (c, channel) in rgb.iter_mut().enumerate() {
            let v = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1, c) * fx * fy;
            *channel = v.round().clamp(0.0, 255.0) as u8;
        }
        *pixel = Rgb(rgb);
    }
    out
}

/// Align a face given its five detected landmarks.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5], size: u32) -> RgbImage {
    let transform = estimate_similarity(landmarks, &reference_landmarks(size));
    warp_rgb(image, &transform, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_when_points_match() {
        let pts = REFERENCE_LANDMARKS_112;
        let t = estimate_similarity(&pts, &pts);
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3 && t.ty.abs() < 1e-3, "t = ({}, {})", t.tx, t.ty);
    }

    #[test]
    fn test_recovers_half_scale() {
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0 + 10.0, y * 2.0 - 4.0));
        let t = estimate_similarity(&src, &REFERENCE_LANDMARKS_112);
        assert!((t.a - 0.5).abs() < 1e-3, "a = {}", t.a);
        assert!(t.b.abs() < 1e-3);
        for (s, d) in src.iter().zip(REFERENCE_LANDMARKS_112.iter()) {
            let (x, y) = t.apply(*s);
            assert!((x - d.0).abs() < 1e-2 && (y - d.1).abs() < 1e-2);
        }
    }

    #[test]
    fn test_recovers_rotation() {
        let angle = 0.3f32;
        let rot = Similarity { a: angle.cos(), b: angle.sin(), tx: 5.0, ty: -3.0 };
        let src = REFERENCE_LANDMARKS_112;
        let dst = src.map(|p| rot.apply(p));
        let t = estimate_similarity(&src, &dst);
        assert!((t.a - rot.a).abs() < 1e-3 && (t.b - rot.b).abs() < 1e-3);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = Similarity { a: 0.8, b: 0.2, tx: 12.0, ty: -7.0 };
        let inv = t.inverse().unwrap();
        let (x, y) = inv.apply(t.apply((30.0, 40.0)));
        assert!((x - 30.0).abs() < 1e-3 && (y - 40.0).abs() < 1e-3);
        assert!(Similarity { a: 0.0, b: 0.0, tx: 0.0, ty: 0.0 }.inverse().is_none());
    }

    #[test]
    fn test_reference_scaling() {
        let scaled = reference_landmarks(224);
        assert!((scaled[0].0 - REFERENCE_LANDMARKS_112[0].0 * 2.0).abs() < 1e-4);
        assert_eq!(reference_landmarks(112), REFERENCE_LANDMARKS_112);
    }

    #[test]
    fn test_align_output_size_and_colour() {
        let image = RgbImage::from_pixel(200, 160, Rgb([10, 120, 240]));
        let crop = align_face(&image, &REFERENCE_LANDMARKS_112.map(|(x, y)| (x + 40.0, y + 20.0)), 112);
        assert_eq!(crop.dimensions(), (112, 112));
        assert_eq!(crop.get_pixel(56, 56).0, [10, 120, 240]);
    }

    #[test]
    fn test_landmark_patch_lands_on_reference() {
        let mut image = RgbImage::new(200, 200);
        let src: [(f32, f32); 5] = [(80.0, 60.0), (120.0, 60.0), (100.0, 85.0), (85.0, 110.0), (115.0, 110.0)];
        let (lx, ly) = (src[0].0 as u32, src[0].1 as u32);
        for y in ly - 2..=ly + 2 {
            for x in lx - 2..=lx + 2 {
                image.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }

        let crop = align_face(&image, &src, 112);
        let (rx, ry) = (
            REFERENCE_LANDMARKS_112[0].0.round() as u32,
            REFERENCE_LANDMARKS_112[0].1.round() as u32,
        );
        let brightest = (ry - 1..=ry + 1)
            .flat_map(|y| (rx - 1..=rx + 1).map(move |x| (x, y)))
            .map(|(x, y)| crop.get_pixel(x, y).0[0])
            .max()
            .unwrap();
        assert!(brightest > 100, "expected bright patch near ({rx}, {ry}), max={brightest}");
    }
}
