//! Spatial algebra for rigid transforms, twists and joint Jacobians.
//!
//! Spatial vectors follow the `[angular (3), linear (3)]` ordering. Rotations
//! are parameterized by the SO(3) exponential map: a 3-vector `q` whose
//! direction is the rotation axis and whose norm is the angle.
//!
//! The exponential-map Jacobian here is the *left* Jacobian
//!
//! ```text
//! J(q) = I + (1 - cos θ)/θ² [q]× + (θ - sin θ)/θ³ [q]×²
//! ```
//!
//! so `J(-q)` maps coordinate rates to angular velocity in the rotated (body)
//! frame. Functions here are pure math with no tree or joint state.

use nalgebra::{
    Isometry3, Matrix3, SMatrix, Translation3, UnitQuaternion, Vector3, Vector6,
};

/// 6D spatial vector: [angular (3), linear (3)].
pub type SpatialVector = Vector6<f64>;

/// Spatial Jacobian with one column per degree of freedom.
pub type SpatialJacobian<const N: usize> = SMatrix<f64, 6, N>;

/// Below this rotation angle the exp-map series expansions are used.
pub const EXP_MAP_EPSILON: f64 = 1e-6;

/// Assemble a spatial vector from its angular and linear parts.
#[must_use]
pub fn spatial_vector(angular: &Vector3<f64>, linear: &Vector3<f64>) -> SpatialVector {
    SpatialVector::new(
        angular.x, angular.y, angular.z, linear.x, linear.y, linear.z,
    )
}

/// Angular part of a spatial vector.
#[inline]
#[must_use]
pub fn angular(v: &SpatialVector) -> Vector3<f64> {
    Vector3::new(v[0], v[1], v[2])
}

/// Linear part of a spatial vector.
#[inline]
#[must_use]
pub fn linear(v: &SpatialVector) -> Vector3<f64> {
    Vector3::new(v[3], v[4], v[5])
}

/// Skew-symmetric cross-product matrix: `skew(a) * b == a × b`.
#[must_use]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Exponential map from an axis-angle vector to a rotation.
#[must_use]
pub fn exp_map_rot(q: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_scaled_axis(*q)
}

/// Pure rotation transform for an axis-angle vector.
#[must_use]
pub fn exp_angular(q: &Vector3<f64>) -> Isometry3<f64> {
    Isometry3::from_parts(Translation3::identity(), exp_map_rot(q))
}

/// Log map from a rotation to its axis-angle vector (principal branch).
///
/// The angle of the result lies in `[0, π]`. At exactly π the axis sign is
/// arbitrary; coordinates near π are poorly conditioned.
#[must_use]
pub fn log_map(rotation: &UnitQuaternion<f64>) -> Vector3<f64> {
    rotation.scaled_axis()
}

/// Left Jacobian of the SO(3) exponential map.
#[must_use]
pub fn exp_map_jac(q: &Vector3<f64>) -> Matrix3<f64> {
    let theta = q.norm();
    let qss = skew(q);
    let qss2 = qss * qss;

    if theta < EXP_MAP_EPSILON {
        Matrix3::identity() + qss * 0.5 + qss2 * (1.0 / 6.0)
    } else {
        let t2 = theta * theta;
        let t3 = t2 * theta;
        Matrix3::identity() + qss * ((1.0 - theta.cos()) / t2) + qss2 * ((theta - theta.sin()) / t3)
    }
}

/// Time derivative of [`exp_map_jac`] along the coordinate rate `q_dot`.
#[must_use]
pub fn exp_map_jac_dot(q: &Vector3<f64>, q_dot: &Vector3<f64>) -> Matrix3<f64> {
    let theta = q.norm();
    let qss = skew(q);
    let qdss = skew(q_dot);
    let mixed = qss * qdss + qdss * qss;

    if theta < EXP_MAP_EPSILON {
        return qdss * 0.5 + mixed * (1.0 / 6.0);
    }

    let (st, ct) = theta.sin_cos();
    let t2 = theta * theta;
    let t3 = t2 * theta;
    let t4 = t3 * theta;

    let a = (1.0 - ct) / t2;
    let b = (theta - st) / t3;
    let theta_dot = q.dot(q_dot) / theta;
    let a_dot = (theta * st - 2.0 * (1.0 - ct)) / t3 * theta_dot;
    let b_dot = ((1.0 - ct) * theta - 3.0 * (theta - st)) / t4 * theta_dot;

    qdss * a + qss * a_dot + mixed * b + qss * qss * b_dot
}

/// Adjoint transform of a spatial vector: re-express `v` through `tf`.
#[must_use]
pub fn ad_t(tf: &Isometry3<f64>, v: &SpatialVector) -> SpatialVector {
    let w = tf.rotation * angular(v);
    let lin = tf.translation.vector.cross(&w) + tf.rotation * linear(v);
    spatial_vector(&w, &lin)
}

/// Inverse adjoint transform: `ad_inv_t(tf, v) == ad_t(&tf.inverse(), v)`.
#[must_use]
pub fn ad_inv_t(tf: &Isometry3<f64>, v: &SpatialVector) -> SpatialVector {
    let inv_rot = tf.rotation.inverse();
    let w = angular(v);
    let lin = linear(v) - tf.translation.vector.cross(&w);
    spatial_vector(&(inv_rot * w), &(inv_rot * lin))
}

/// Apply [`ad_t`] to every column of a spatial Jacobian.
#[must_use]
pub fn ad_t_jac<const N: usize>(
    tf: &Isometry3<f64>,
    jac: &SpatialJacobian<N>,
) -> SpatialJacobian<N> {
    let mut out = SpatialJacobian::<N>::zeros();
    for i in 0..N {
        let col: SpatialVector = jac.column(i).into_owned();
        out.set_column(i, &ad_t(tf, &col));
    }
    out
}

/// Spatial cross product (Lie bracket) of two motion vectors.
#[must_use]
pub fn ad(v: &SpatialVector, w: &SpatialVector) -> SpatialVector {
    let v_ang = angular(v);
    let w_ang = angular(w);
    spatial_vector(
        &v_ang.cross(&w_ang),
        &(v_ang.cross(&linear(w)) + linear(v).cross(&w_ang)),
    )
}

/// True when every entry is finite.
#[must_use]
pub fn is_finite<const R: usize, const C: usize>(m: &SMatrix<f64, R, C>) -> bool {
    m.iter().all(|x| x.is_finite())
}

/// True when `tf` is a finite rigid transform with an orthonormal,
/// right-handed rotation block (within `tolerance`).
#[must_use]
pub fn verify_transform(tf: &Isometry3<f64>, tolerance: f64) -> bool {
    if !tf.translation.vector.iter().all(|x| x.is_finite())
        || !tf.rotation.coords.iter().all(|x| x.is_finite())
    {
        return false;
    }

    let r = tf.rotation.to_rotation_matrix().into_inner();
    let orthonormal = (r.transpose() * r - Matrix3::identity()).amax() <= tolerance;
    orthonormal && (r.determinant() - 1.0).abs() <= tolerance
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_skew_is_cross_product() {
        let a = Vector3::new(1.0, -2.0, 0.5);
        let b = Vector3::new(0.3, 0.7, -1.1);
        assert_relative_eq!(skew(&a) * b, a.cross(&b), epsilon = 1e-12);
    }

    #[test]
    fn test_exp_log_quarter_turn() {
        let q = Vector3::new(0.0, 0.0, FRAC_PI_2);
        let r = exp_map_rot(&q);
        assert_relative_eq!(r * Vector3::x(), Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(log_map(&r), q, epsilon = 1e-12);
    }

    #[test]
    fn test_log_of_identity_is_zero() {
        assert_relative_eq!(
            log_map(&UnitQuaternion::identity()),
            Vector3::zeros(),
            epsilon = 1e-15
        );
    }

    #[test]
    fn test_exp_map_jac_small_angle_matches_closed_form() {
        let q = Vector3::new(1e-7, -2e-7, 3e-7);
        let series = exp_map_jac(&q);
        let q_big = q * 1e4;
        let closed = exp_map_jac(&q_big);
        assert_relative_eq!(series, Matrix3::identity(), epsilon = 1e-6);
        assert_relative_eq!(closed, Matrix3::identity(), epsilon = 1e-2);
    }

    #[test]
    fn test_exp_map_jac_maps_rates_to_body_velocity() {
        // exp(q)^T d/dt exp(q) == [J(-q) q_dot]×
        let q = Vector3::new(0.4, -0.3, 0.9);
        let q_dot = Vector3::new(0.2, 0.5, -0.1);
        let h = 1e-6;

        let r0 = exp_map_rot(&(q - q_dot * h));
        let r1 = exp_map_rot(&(q + q_dot * h));
        let numeric = log_map(&(r0.inverse() * r1)) / (2.0 * h);

        assert_relative_eq!(numeric, exp_map_jac(&-q) * q_dot, epsilon = 1e-6);
    }

    #[test]
    fn test_exp_map_jac_dot_matches_finite_difference() {
        let q = Vector3::new(0.7, 0.1, -0.4);
        let q_dot = Vector3::new(-0.3, 0.8, 0.2);
        let h = 1e-6;

        let numeric = (exp_map_jac(&(q + q_dot * h)) - exp_map_jac(&(q - q_dot * h))) / (2.0 * h);
        assert_relative_eq!(exp_map_jac_dot(&q, &q_dot), numeric, epsilon = 1e-6);
    }

    #[test]
    fn test_exp_map_jac_dot_at_origin() {
        let q_dot = Vector3::new(0.0, 0.0, 2.0);
        assert_relative_eq!(
            exp_map_jac_dot(&Vector3::zeros(), &q_dot),
            skew(&q_dot) * 0.5,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_ad_t_round_trip() {
        let tf = Isometry3::new(Vector3::new(1.0, 2.0, -0.5), Vector3::new(0.3, -0.2, 0.8));
        let v = SpatialVector::new(0.1, 0.2, 0.3, -1.0, 0.5, 2.0);

        assert_relative_eq!(ad_inv_t(&tf, &ad_t(&tf, &v)), v, epsilon = 1e-12);
        assert_relative_eq!(ad_inv_t(&tf, &v), ad_t(&tf.inverse(), &v), epsilon = 1e-12);
    }

    #[test]
    fn test_ad_t_pure_translation() {
        let tf = Isometry3::translation(0.0, 1.0, 0.0);
        let v = spatial_vector(&Vector3::z(), &Vector3::zeros());
        // Spinning about z, seen from a frame offset along +y.
        let out = ad_t(&tf, &v);
        assert_relative_eq!(angular(&out), Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(linear(&out), Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_ad_t_jac_is_columnwise() {
        let tf = Isometry3::new(Vector3::new(0.5, 0.0, 0.2), Vector3::new(0.0, 0.4, 0.0));
        let mut jac = SpatialJacobian::<2>::zeros();
        jac.set_column(0, &SpatialVector::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0));
        jac.set_column(1, &SpatialVector::new(0.0, 0.0, 0.0, 0.0, 1.0, 0.0));

        let out = ad_t_jac(&tf, &jac);
        for i in 0..2 {
            let col: SpatialVector = jac.column(i).into_owned();
            let expected = ad_t(&tf, &col);
            let actual: SpatialVector = out.column(i).into_owned();
            assert_relative_eq!(actual, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_ad_is_antisymmetric() {
        let v = SpatialVector::new(0.1, -0.4, 0.2, 1.0, 0.0, -2.0);
        let w = SpatialVector::new(-0.3, 0.5, 0.9, 0.2, 0.7, 0.1);
        assert_relative_eq!(ad(&v, &w), -ad(&w, &v), epsilon = 1e-12);
        assert_relative_eq!(ad(&v, &v), SpatialVector::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_verify_transform() {
        let tf = Isometry3::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(0.1, 0.2, 0.3));
        assert!(verify_transform(&tf, 1e-9));

        let broken = Isometry3::translation(f64::NAN, 0.0, 0.0);
        assert!(!verify_transform(&broken, 1e-9));
    }

    #[test]
    fn test_is_finite() {
        let mut m = SpatialJacobian::<3>::zeros();
        assert!(is_finite(&m));
        m[(4, 1)] = f64::INFINITY;
        assert!(!is_finite(&m));
    }
}
