//! Similarity transforms and their matrix form.
//!
//! A [`SimilarityTransform`] is uniform scale, rotation (degrees), and
//! translation. Its matrix is composed as
//! `T(translation) · T(s·c) · R(rotation) · T(-s·c) · S(scale)` where `c` is
//! an optional rotation center given in unscaled data units. Pivoting around
//! `s·c` keeps rotations and flips centered on the object's content.
//! [`SimilarityTransform::from_matrix`] undoes exactly this composition.

use serde::{Deserialize, Serialize};

use crate::geometry::{Matrix3, Point};

/// Uniform scale, rotation, and translation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimilarityTransform {
    pub scale: f64,
    /// Counter-clockwise rotation in degrees.
    pub rotation: f64,
    pub translation: Point,
}

impl Default for SimilarityTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation: 0.0,
            translation: Point::ORIGIN,
        }
    }
}

impl SimilarityTransform {
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        rotation: 0.0,
        translation: Point::ORIGIN,
    };

    pub fn new(scale: f64, rotation: f64, translation: Point) -> Self {
        Self {
            scale,
            rotation,
            translation,
        }
    }

    pub fn translate(x: f64, y: f64) -> Self {
        Self {
            translation: Point::new(x, y),
            ..Self::IDENTITY
        }
    }

    pub fn to_matrix(&self, rotation_center: Option<Point>) -> Matrix3 {
        let pivot = rotation_center.unwrap_or(Point::ORIGIN).scale(self.scale);
        Matrix3::from_translation(self.translation.x, self.translation.y)
            * Matrix3::from_translation(pivot.x, pivot.y)
            * Matrix3::from_rotation(self.rotation)
            * Matrix3::from_translation(-pivot.x, -pivot.y)
            * Matrix3::from_scale(self.scale, self.scale)
    }

    /// Factors a similarity matrix back into scale, rotation, and translation.
    ///
    /// `rotation_center` must be the center that was passed to
    /// [`to_matrix`](Self::to_matrix). The rotation comes back in `[-180, 180)`.
    pub fn from_matrix(matrix: &Matrix3, rotation_center: Option<Point>) -> Self {
        let r = &matrix.rows;
        let scale = r[0][0].hypot(r[1][0]);
        let mut rotation = r[1][0].atan2(r[0][0]).to_degrees();
        if rotation >= 180.0 {
            rotation -= 360.0;
        }

        let pivot = rotation_center.unwrap_or(Point::ORIGIN).scale(scale);
        let rotated = Matrix3::from_rotation(rotation).apply(pivot);
        let translation = Point::new(
            r[0][2] - (pivot.x - rotated.x),
            r[1][2] - (pivot.y - rotated.y),
        );

        Self {
            scale,
            rotation,
            translation,
        }
    }
}

/// Horizontal mirror about the vertical line through `center` (origin if `None`).
pub fn flip_matrix(center: Option<Point>) -> Matrix3 {
    let cx = center.map_or(0.0, |c| c.x);
    Matrix3::from_rows([[-1.0, 0.0, 2.0 * cx], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
}

/// Data→world matrix for one rendered instance: flip, then data→layer, then
/// layer→world, combined as matrices.
///
/// `content_center` is the data-space center of the object's content; it is
/// the flip axis and the rotation pivot of the data→layer transform.
pub fn data_to_world(
    flip: bool,
    data_to_layer: &SimilarityTransform,
    layer_to_world: &SimilarityTransform,
    content_center: Option<Point>,
) -> Matrix3 {
    let flip = if flip {
        flip_matrix(content_center)
    } else {
        Matrix3::IDENTITY
    };
    layer_to_world.to_matrix(None) * data_to_layer.to_matrix(content_center) * flip
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn angle_diff(a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(360.0);
        d.min(360.0 - d)
    }

    fn assert_close(a: &SimilarityTransform, b: &SimilarityTransform) {
        assert!((a.scale - b.scale).abs() < 1e-9, "{a:?} vs {b:?}");
        assert!(angle_diff(a.rotation, b.rotation) < 1e-7, "{a:?} vs {b:?}");
        assert!((a.translation.x - b.translation.x).abs() < 1e-6, "{a:?} vs {b:?}");
        assert!((a.translation.y - b.translation.y).abs() < 1e-6, "{a:?} vs {b:?}");
    }

    #[test]
    fn test_identity_matrix() {
        assert_eq!(SimilarityTransform::IDENTITY.to_matrix(None), Matrix3::IDENTITY);
    }

    #[test]
    fn test_translate_then_apply() {
        let t = SimilarityTransform::translate(10.0, 20.0);
        let p = t.to_matrix(None).apply(Point::new(5.0, 5.0));
        assert!((p.x - 15.0).abs() < 1e-10);
        assert!((p.y - 25.0).abs() < 1e-10);
    }

    #[test]
    fn test_scale_is_applied_before_translation() {
        let t = SimilarityTransform::new(2.0, 0.0, Point::new(1.0, 1.0));
        let p = t.to_matrix(None).apply(Point::new(3.0, 4.0));
        assert!((p.x - 7.0).abs() < 1e-10);
        assert!((p.y - 9.0).abs() < 1e-10);
    }

    #[test]
    fn test_rotation_pivots_on_scaled_center() {
        // A 90° turn about the content center must leave the center fixed.
        let center = Point::new(50.0, 50.0);
        let t = SimilarityTransform::new(2.0, 90.0, Point::ORIGIN);
        let p = t.to_matrix(Some(center)).apply(center);
        assert!((p.x - 100.0).abs() < 1e-9);
        assert!((p.y - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_with_center() {
        let center = Some(Point::new(256.0, 128.0));
        let t = SimilarityTransform::new(0.5, -30.0, Point::new(12.0, -7.0));
        let back = SimilarityTransform::from_matrix(&t.to_matrix(center), center);
        assert_close(&back, &t);
    }

    #[test]
    fn test_rotation_180_normalizes_to_negative() {
        let t = SimilarityTransform::new(1.0, 180.0, Point::ORIGIN);
        let back = SimilarityTransform::from_matrix(&t.to_matrix(None), None);
        assert!(back.rotation < 180.0 && back.rotation >= -180.0);
        assert!(angle_diff(back.rotation, 180.0) < 1e-9);
    }

    #[test]
    fn test_flip_mirrors_about_center() {
        let m = flip_matrix(Some(Point::new(10.0, 0.0)));
        assert_eq!(m.apply(Point::new(0.0, 3.0)), Point::new(20.0, 3.0));
        assert_eq!(m.apply(Point::new(10.0, 3.0)), Point::new(10.0, 3.0));
    }

    #[test]
    fn test_data_to_world_is_matrix_product_not_parameter_sum() {
        let data_to_layer = SimilarityTransform::new(2.0, 90.0, Point::new(5.0, 0.0));
        let layer_to_world = SimilarityTransform::new(3.0, 45.0, Point::new(0.0, 7.0));
        let m = data_to_world(false, &data_to_layer, &layer_to_world, None);
        let expected = layer_to_world.to_matrix(None) * data_to_layer.to_matrix(None);
        assert!(m.approx_eq(&expected, 1e-12));

        let factored = SimilarityTransform::from_matrix(&m, None);
        assert!((factored.scale - 6.0).abs() < 1e-9);
        assert!(angle_diff(factored.rotation, 135.0) < 1e-9);
    }

    #[test]
    fn test_flip_applies_in_data_space() {
        let data_to_layer = SimilarityTransform::translate(100.0, 0.0);
        let m = data_to_world(
            true,
            &data_to_layer,
            &SimilarityTransform::IDENTITY,
            Some(Point::new(1.0, 0.0)),
        );
        // x=0 flips to x=2 about the center, then translates.
        let p = m.apply(Point::new(0.0, 0.0));
        assert!((p.x - 102.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_from_matrix_inverts_to_matrix(
            scale in 0.001f64..1000.0,
            rotation in -180.0f64..180.0,
            tx in -1.0e5f64..1.0e5,
            ty in -1.0e5f64..1.0e5,
        ) {
            let t = SimilarityTransform::new(scale, rotation, Point::new(tx, ty));
            let back = SimilarityTransform::from_matrix(&t.to_matrix(None), None);
            prop_assert!((back.scale - scale).abs() <= 1e-9 * scale.max(1.0));
            prop_assert!(angle_diff(back.rotation, rotation) < 1e-7);
            prop_assert!((-180.0..180.0).contains(&back.rotation));
            prop_assert!((back.translation.x - tx).abs() < 1e-6);
            prop_assert!((back.translation.y - ty).abs() < 1e-6);
        }
    }
}
