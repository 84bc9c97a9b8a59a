// ─────────────────────────────────────────────────────────────────────
// IGSOA GW Engine — Grid Geometry
// ─────────────────────────────────────────────────────────────────────
//! Cartesian vector and the node layout shared by the field grid and
//! the source model. Node (i, j, k) sits at (i·dx, j·dy, k·dz); the flat
//! storage index is `i + nx·(j + ny·k)`.

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Position or direction in physical space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm_sq(self) -> f64 {
        self.dot(self)
    }

    pub fn norm(self) -> f64 {
        self.norm_sq().sqrt()
    }

    pub fn distance(self, other: Vec3) -> f64 {
        (self - other).norm()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Node counts and spacings of a uniform Cartesian grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl GridGeometry {
    pub fn len(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nz]
    }

    pub fn spacing(&self) -> [f64; 3] {
        [self.dx, self.dy, self.dz]
    }

    /// Volume element dx·dy·dz.
    pub fn cell_volume(&self) -> f64 {
        self.dx * self.dy * self.dz
    }

    #[inline]
    pub fn flat_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.nx * (j + self.ny * k)
    }

    /// Inverse of [`flat_index`](Self::flat_index).
    #[inline]
    pub fn unflatten(&self, idx: usize) -> (usize, usize, usize) {
        let i = idx % self.nx;
        let j = (idx / self.nx) % self.ny;
        let k = idx / (self.nx * self.ny);
        (i, j, k)
    }

    pub fn contains_index(&self, i: usize, j: usize, k: usize) -> bool {
        i < self.nx && j < self.ny && k < self.nz
    }

    #[inline]
    pub fn position(&self, i: usize, j: usize, k: usize) -> Vec3 {
        Vec3::new(i as f64 * self.dx, j as f64 * self.dy, k as f64 * self.dz)
    }

    /// Upper bound of the node domain per axis, `(n - 1)·d`.
    pub fn extent(&self) -> [f64; 3] {
        [
            self.nx.saturating_sub(1) as f64 * self.dx,
            self.ny.saturating_sub(1) as f64 * self.dy,
            self.nz.saturating_sub(1) as f64 * self.dz,
        ]
    }

    /// Geometric center of the node domain.
    pub fn center(&self) -> Vec3 {
        let e = self.extent();
        Vec3::new(e[0] * 0.5, e[1] * 0.5, e[2] * 0.5)
    }

    /// True if `p` lies in the closed box `[0, extent]` on every axis.
    pub fn contains_position(&self, p: Vec3) -> bool {
        let e = self.extent();
        p.is_finite()
            && (0.0..=e[0]).contains(&p.x)
            && (0.0..=e[1]).contains(&p.y)
            && (0.0..=e[2]).contains(&p.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom() -> GridGeometry {
        GridGeometry {
            nx: 4,
            ny: 3,
            nz: 2,
            dx: 0.5,
            dy: 1.0,
            dz: 2.0,
        }
    }

    #[test]
    fn test_flat_index_roundtrip() {
        let g = geom();
        for idx in 0..g.len() {
            let (i, j, k) = g.unflatten(idx);
            assert_eq!(g.flat_index(i, j, k), idx);
        }
        assert_eq!(g.flat_index(1, 2, 1), 1 + 4 * (2 + 3));
    }

    #[test]
    fn test_extent_and_center() {
        let g = geom();
        assert_eq!(g.extent(), [1.5, 2.0, 2.0]);
        assert_eq!(g.center(), Vec3::new(0.75, 1.0, 1.0));
        assert!(g.contains_position(Vec3::new(1.5, 2.0, 2.0)));
        assert!(!g.contains_position(Vec3::new(1.6, 0.0, 0.0)));
        assert!(!g.contains_position(Vec3::new(-0.1, 0.0, 0.0)));
    }

    #[test]
    fn test_vector_ops() {
        let a = Vec3::new(1.0, 2.0, 2.0);
        assert!((a.norm() - 3.0).abs() < 1e-12);
        assert_eq!(a - a, Vec3::ZERO);
        assert_eq!((a + a) * 0.5, a);
    }
}
