//! Half-space triangle rasterization
//!
//! A pixel is covered when its center lies inside the triangle. Pixels exactly
//! on an edge belong to only one of the two triangles sharing that edge, so a
//! closed mesh covers every interior pixel exactly once.

#[inline]
fn edge(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

/// Whether a pixel center lying exactly on edge `a -> b` is owned by it.
/// Antisymmetric in direction, so a shared edge has a single owner.
#[inline]
fn owns_edge(a: [f32; 2], b: [f32; 2]) -> bool {
    let dy = b[1] - a[1];
    dy > 0.0 || (dy == 0.0 && b[0] - a[0] > 0.0)
}

/// Rasterize one triangle given in pixel coordinates.
///
/// `shade(x, y, weights)` receives barycentric weights in the caller's vertex
/// order. Returns the number of covered pixels.
pub fn rasterize<F>(vertices: [[f32; 2]; 3], width: u32, height: u32, mut shade: F) -> usize
where
    F: FnMut(u32, u32, [f32; 3]),
{
    if width == 0 || height == 0 {
        return 0;
    }

    let area = edge(vertices[0], vertices[1], vertices[2]);
    if area == 0.0 || !area.is_finite() {
        return 0;
    }
    // Work counter-clockwise internally; remember how to map weights back
    let (v, flipped) = if area > 0.0 {
        (vertices, false)
    } else {
        ([vertices[0], vertices[2], vertices[1]], true)
    };
    let area = area.abs();

    let min_x = v.iter().map(|p| p[0]).fold(f32::MAX, f32::min);
    let max_x = v.iter().map(|p| p[0]).fold(f32::MIN, f32::max);
    let min_y = v.iter().map(|p| p[1]).fold(f32::MAX, f32::min);
    let max_y = v.iter().map(|p| p[1]).fold(f32::MIN, f32::max);

    let x_start = ((min_x - 0.5).ceil().max(0.0)) as i64;
    let x_end = ((max_x - 0.5).floor() as i64).min(width as i64 - 1);
    let y_start = ((min_y - 0.5).ceil().max(0.0)) as i64;
    let y_end = ((max_y - 0.5).floor() as i64).min(height as i64 - 1);

    let owns = [owns_edge(v[1], v[2]), owns_edge(v[2], v[0]), owns_edge(v[0], v[1])];
    let mut covered = 0;

    for y in y_start..=y_end {
        for x in x_start..=x_end {
            let p = [x as f32 + 0.5, y as f32 + 0.5];
            let e = [edge(v[1], v[2], p), edge(v[2], v[0], p), edge(v[0], v[1], p)];
            let inside = (0..3).all(|i| e[i] > 0.0 || (e[i] == 0.0 && owns[i]));
            if !inside {
                continue;
            }
            let w = [e[0] / area, e[1] / area, e[2] / area];
            let weights = if flipped { [w[0], w[2], w[1]] } else { w };
            shade(x as u32, y as u32, weights);
            covered += 1;
        }
    }
    covered
}

/// Interpolate per-vertex attributes with barycentric weights
#[inline]
pub fn interpolate<const N: usize>(attrs: [[f32; N]; 3], w: [f32; 3]) -> [f32; N] {
    std::array::from_fn(|i| attrs[0][i] * w[0] + attrs[1][i] * w[1] + attrs[2][i] * w[2])
}
