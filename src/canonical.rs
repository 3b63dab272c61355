//! Canonical face-space mapping table
//!
//! Every landmark index owns a fixed (u, v) position in a pose-independent
//! unit square, and a fixed triangle list stitches the landmarks into a
//! closed mesh. The table is validated once at load time and never mutated.

use log::{debug, info};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{MosaicError, MosaicResult};

/// Immutable canonical (u, v) coordinates and mesh triangulation
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalMap {
    uvs: Vec<[f32; 2]>,
    triangles: Vec<[u32; 3]>,
}

/// Triangle datasets appear both as index triples and as a flat index list
#[derive(Deserialize)]
#[serde(untagged)]
enum TriangleFile {
    Triples(Vec<[u32; 3]>),
    Flat(Vec<u32>),
}

impl CanonicalMap {
    /// Build from in-memory datasets, validating against `expected_landmarks`
    pub fn from_parts(
        uvs: Vec<[f32; 2]>,
        triangles: Vec<[u32; 3]>,
        expected_landmarks: usize,
    ) -> MosaicResult<Self> {
        let map = Self { uvs, triangles };
        map.validate(expected_landmarks)?;
        debug!(
            "Canonical map validated: {} landmarks, {} triangles",
            map.uvs.len(),
            map.triangles.len()
        );
        Ok(map)
    }

    /// Load the two JSON datasets from disk.
    ///
    /// `uv_path` holds `[[u, v], ...]`; `triangle_path` holds either
    /// `[[a, b, c], ...]` or a flat `[a, b, c, a, b, c, ...]` list.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        uv_path: P,
        triangle_path: Q,
        expected_landmarks: usize,
    ) -> MosaicResult<Self> {
        let uvs: Vec<[f32; 2]> = serde_json::from_str(&fs::read_to_string(uv_path.as_ref())?)?;

        let file: TriangleFile = serde_json::from_str(&fs::read_to_string(triangle_path.as_ref())?)?;
        let triangles = match file {
            TriangleFile::Triples(triples) => triples,
            TriangleFile::Flat(flat) => {
                if flat.len() % 3 != 0 {
                    return Err(MosaicError::CanonicalData(format!(
                        "flat triangle list has {} indices, not a multiple of 3",
                        flat.len()
                    )));
                }
                flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect()
            }
        };

        let map = Self::from_parts(uvs, triangles, expected_landmarks)?;
        info!(
            "📐 Loaded canonical map from {} ({} triangles)",
            uv_path.as_ref().display(),
            map.triangles.len()
        );
        Ok(map)
    }

    /// Regular `cols` x `rows` grid spanning the unit square, two triangles
    /// per cell. An 18 x 26 grid yields a 468-landmark table.
    pub fn synthetic_grid(cols: u32, rows: u32) -> MosaicResult<Self> {
        if cols < 2 || rows < 2 {
            return Err(MosaicError::CanonicalData(format!(
                "synthetic grid needs at least 2x2 points, got {}x{}",
                cols, rows
            )));
        }

        let mut uvs = Vec::with_capacity((cols * rows) as usize);
        for r in 0..rows {
            for c in 0..cols {
                uvs.push([c as f32 / (cols - 1) as f32, r as f32 / (rows - 1) as f32]);
            }
        }

        let mut triangles = Vec::with_capacity(((cols - 1) * (rows - 1) * 2) as usize);
        for r in 0..rows - 1 {
            for c in 0..cols - 1 {
                let i = r * cols + c;
                triangles.push([i, i + 1, i + cols]);
                triangles.push([i + 1, i + cols + 1, i + cols]);
            }
        }

        Self::from_parts(uvs, triangles, (cols * rows) as usize)
    }

    fn validate(&self, expected_landmarks: usize) -> MosaicResult<()> {
        let fail = |msg: String| Err(MosaicError::CanonicalData(msg));

        if self.uvs.len() != expected_landmarks {
            return fail(format!(
                "expected {} canonical coordinates, found {}",
                expected_landmarks,
                self.uvs.len()
            ));
        }
        if let Some((i, uv)) = self
            .uvs
            .iter()
            .enumerate()
            .find(|(_, uv)| !uv.iter().all(|c| c.is_finite() && (0.0..=1.0).contains(c)))
        {
            return fail(format!("coordinate {} = {:?} lies outside the unit square", i, uv));
        }
        if self.triangles.is_empty() {
            return fail("triangle list is empty".to_string());
        }

        let mut referenced = HashSet::with_capacity(expected_landmarks);
        let mut total_area = 0.0f64;
        for (t, tri) in self.triangles.iter().enumerate() {
            if let Some(bad) = tri.iter().find(|&&i| i as usize >= expected_landmarks) {
                return fail(format!("triangle {} references landmark {} (out of range)", t, bad));
            }
            if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
                return fail(format!("triangle {} repeats a vertex: {:?}", t, tri));
            }
            let area = self.triangle_area(tri).abs();
            if area < 1e-9 {
                return fail(format!("triangle {} has zero canonical area", t));
            }
            total_area += area as f64;
            referenced.extend(tri.iter().copied());
        }

        if referenced.len() != expected_landmarks {
            return fail(format!(
                "mesh covers {} of {} landmarks",
                referenced.len(),
                expected_landmarks
            ));
        }
        // Overlapping triangles would cover more than the unit square
        if total_area > 1.0 + 1e-3 {
            return fail(format!("triangles overlap: total canonical area {:.4}", total_area));
        }
        Ok(())
    }

    /// Signed canonical-space area of a triangle
    fn triangle_area(&self, tri: &[u32; 3]) -> f32 {
        let [a, b, c] = tri.map(|i| self.uvs[i as usize]);
        0.5 * ((b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1]))
    }

    pub fn landmark_count(&self) -> usize {
        self.uvs.len()
    }

    pub fn uvs(&self) -> &[[f32; 2]] {
        &self.uvs
    }

    pub fn uv(&self, index: usize) -> [f32; 2] {
        self.uvs[index]
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }
}
