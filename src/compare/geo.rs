//! Geography equality: epsilon points, order-sensitive polygons

use super::numeric::floats_equal;
use crate::types::{Geography, GeographyPoint};

/// Longitude and latitude each equal under the float epsilon rule
pub fn points_equal(expected: &GeographyPoint, actual: &GeographyPoint, epsilon: f64) -> bool {
    floats_equal(expected.latitude(), actual.latitude(), epsilon)
        && floats_equal(expected.longitude(), actual.longitude(), epsilon)
}

/// Compare polygons ring by ring and vertex by vertex in traversal order.
///
/// A ring traversed in the opposite direction, or rotated to start at a
/// different vertex, is a different polygon here. `Err` names the first
/// difference.
pub fn polygons_equal(expected: &Geography, actual: &Geography, epsilon: f64) -> Result<(), String> {
    let (e_rings, a_rings) = (expected.rings(), actual.rings());
    if e_rings.len() != a_rings.len() {
        return Err(format!(
            "ring count differs: expected {}, actual {}",
            e_rings.len(),
            a_rings.len()
        ));
    }
    for (r, (e_ring, a_ring)) in e_rings.iter().zip(a_rings).enumerate() {
        if e_ring.len() != a_ring.len() {
            return Err(format!(
                "ring {} vertex count differs: expected {}, actual {}",
                r,
                e_ring.len(),
                a_ring.len()
            ));
        }
        for (v, (e, a)) in e_ring.iter().zip(a_ring).enumerate() {
            if !points_equal(e, a, epsilon) {
                return Err(format!("ring {} vertex {}: expected {}, actual {}", r, v, e, a));
            }
        }
    }
    Ok(())
}
