//! Scalar and vector statistics used when training templates,
//! plus the per-axis angular distance used by absolute joint matching.

use std::f32::consts::PI;

use nalgebra::{UnitQuaternion, Vector3};

const DIRECTION_EPS: f32 = 1e-6;

pub fn mean(data: &[f32]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f32>() / data.len() as f32
}

/// Mean and sample standard deviation. Fewer than two samples give std = 0.
pub fn mean_std(data: &[f32]) -> (f32, f32) {
    let mean = mean(data);
    if data.len() <= 1 {
        return (mean, 0.0);
    }
    let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / (data.len() - 1) as f32;
    (mean, variance.sqrt())
}

/// First and third quartile of sorted data, by index `len/4` and `3*len/4`.
fn quartiles(sorted: &[f32]) -> (f32, f32) {
    let len = sorted.len();
    (sorted[len / 4], sorted[len * 3 / 4])
}

/// Like [`mean_std`], after dropping values outside the box-plot fences
/// `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]`.
pub fn mean_std_robust(data: &[f32]) -> (f32, f32) {
    if data.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let (q1, q3) = quartiles(&sorted);
    let iqr = q3 - q1;
    let (low, high) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

    let kept: Vec<f32> = sorted.into_iter().filter(|&x| x >= low && x <= high).collect();
    mean_std(&kept)
}

/// Component-wise mean of a set of vectors
pub fn mean_vec(data: &[Vector3<f32>]) -> Vector3<f32> {
    if data.is_empty() {
        return Vector3::zeros();
    }
    data.iter().sum::<Vector3<f32>>() / data.len() as f32
}

/// Mean and per-coordinate sample standard deviation
pub fn mean_std_coords(data: &[Vector3<f32>]) -> (Vector3<f32>, Vector3<f32>) {
    let avg = mean_vec(data);
    if data.len() <= 1 {
        return (avg, Vector3::zeros());
    }
    let sum_sq: Vector3<f32> = data.iter().map(|v| (v - avg).component_mul(&(v - avg))).sum();
    (avg, (sum_sq / (data.len() - 1) as f32).map(f32::sqrt))
}

/// Mean and per-axis angular standard deviation (degrees). The deviation of a
/// sample is the folded Euler angle of the rotation taking it onto the mean.
pub fn mean_std_axis_angles(data: &[Vector3<f32>]) -> (Vector3<f32>, Vector3<f32>) {
    let avg = mean_vec(data);
    if data.len() <= 1 {
        return (avg, Vector3::zeros());
    }
    let sum_sq: Vector3<f32> = data
        .iter()
        .map(|v| {
            let d = euler_distance(v, &avg);
            d.component_mul(&d)
        })
        .sum();
    (avg, (sum_sq / (data.len() - 1) as f32).map(f32::sqrt))
}

/// Per-axis magnitude in degrees, each folded into [0, 180], of the rotation
/// taking `from` onto `to`. A zero-length vector has no direction and is a
/// half turn away from everything.
pub fn euler_distance(from: &Vector3<f32>, to: &Vector3<f32>) -> Vector3<f32> {
    let (Some(from), Some(to)) = (
        from.try_normalize(DIRECTION_EPS),
        to.try_normalize(DIRECTION_EPS),
    ) else {
        return Vector3::repeat(180.0);
    };
    // Unit vectors: None only when opposite
    let rotation = UnitQuaternion::rotation_between(&from, &to)
        .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI));
    let (roll, pitch, yaw) = rotation.euler_angles();
    Vector3::new(roll, pitch, yaw).map(|a| a.to_degrees().abs().min(180.0))
}
