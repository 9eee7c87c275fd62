//! Order corner candidates into the expected inner-corner grid.
//!
//! Neighbor links are collected around a global spacing estimate, then BFS
//! walks the lattice assigning integer coordinates. Each visited node carries
//! its own local axis pair, handed down and corrected link by link, which
//! keeps the walk stable under perspective foreshortening. The contract is
//! full grid or nothing: the assigned coordinates must contain a completely
//! populated `cols x rows` rectangle (or its transpose).

use std::collections::{HashMap, VecDeque};

use kiddo::{KdTree, SquaredEuclidean};
use log::debug;
use nalgebra::{Matrix2, Point2, Vector2};

#[derive(Debug, Clone, Copy)]
pub struct LatticeParams {
    /// Neighbor candidates queried per corner.
    pub k_neighbors: usize,
    /// Link length bounds, relative to the estimated spacing.
    pub min_rel_spacing: f64,
    pub max_rel_spacing: f64,
    /// How far a link may deviate from a unit lattice step.
    pub step_tolerance: f64,
}

impl Default for LatticeParams {
    fn default() -> Self {
        Self {
            k_neighbors: 8,
            min_rel_spacing: 0.4,
            max_rel_spacing: 1.8,
            step_tolerance: 0.3,
        }
    }
}

struct Link {
    index: usize,
    vec: Vector2<f64>,
    dist: f64,
}

/// Index `points` into a row-major `cols x rows` grid.
///
/// The returned order is canonical: among all valid traversals of the
/// recovered lattice, the lexicographically smallest point sequence is
/// chosen, so repeated detections of a static board agree.
pub fn index_grid(
    points: &[Point2<f64>],
    cols: usize,
    rows: usize,
    params: &LatticeParams,
) -> Option<Vec<Point2<f64>>> {
    let target = cols * rows;
    if target == 0 || points.len() < target {
        return None;
    }

    let coords: Vec<[f64; 2]> = points.iter().map(|p| [p.x, p.y]).collect();
    let tree: KdTree<f64, 2> = (&coords).into();

    // Nearest-neighbor distances give the spacing estimate.
    let mut raw_neighbors: Vec<Vec<(usize, f64)>> = Vec::with_capacity(points.len());
    let mut nearest = Vec::with_capacity(points.len());
    for (i, q) in coords.iter().enumerate() {
        let found = tree.nearest_n::<SquaredEuclidean>(q, params.k_neighbors + 1);
        let neigh: Vec<(usize, f64)> = found
            .into_iter()
            .filter(|nn| nn.item as usize != i)
            .map(|nn| (nn.item as usize, nn.distance.sqrt()))
            .collect();
        if let Some(&(_, d)) = neigh.first() {
            nearest.push(d);
        }
        raw_neighbors.push(neigh);
    }
    if nearest.is_empty() {
        return None;
    }
    nearest.sort_by(f64::total_cmp);
    let spacing = nearest[nearest.len() / 2];
    if spacing <= f64::EPSILON {
        return None;
    }

    let min_d = params.min_rel_spacing * spacing;
    let max_d = params.max_rel_spacing * spacing;
    let links: Vec<Vec<Link>> = raw_neighbors
        .iter()
        .enumerate()
        .map(|(i, neigh)| {
            neigh
                .iter()
                .filter(|(_, d)| (min_d..=max_d).contains(d))
                .map(|&(j, d)| Link {
                    index: j,
                    vec: points[j] - points[i],
                    dist: d,
                })
                .collect()
        })
        .collect();

    // Seed at the corner closest to the cloud centroid; for a full board that
    // is an interior lattice node with links on all four sides.
    let centroid = {
        let mut c = Vector2::zeros();
        for p in points {
            c += p.coords;
        }
        c / points.len() as f64
    };
    let seed = (0..points.len())
        .filter(|&i| links[i].len() >= 2)
        .min_by(|&a, &b| {
            let da = (points[a].coords - centroid).norm_squared();
            let db = (points[b].coords - centroid).norm_squared();
            da.total_cmp(&db)
        })?;

    let (seed_u, seed_v) = seed_axes(&links[seed])?;

    // BFS with per-node axes.
    let mut coord: Vec<Option<(i32, i32)>> = vec![None; points.len()];
    let mut axes: Vec<(Vector2<f64>, Vector2<f64>)> =
        vec![(Vector2::zeros(), Vector2::zeros()); points.len()];
    let mut queue = VecDeque::new();
    coord[seed] = Some((0, 0));
    axes[seed] = (seed_u, seed_v);
    queue.push_back(seed);

    const STEPS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

    while let Some(idx) = queue.pop_front() {
        let (ci, cj) = coord[idx].unwrap_or((0, 0));
        let (u, v) = axes[idx];
        let Some(basis_inv) = Matrix2::from_columns(&[u, v]).try_inverse() else {
            continue;
        };

        for link in &links[idx] {
            if coord[link.index].is_some() {
                continue;
            }
            let a = basis_inv * link.vec;
            let step = STEPS
                .iter()
                .find(|(si, sj)| {
                    (a.x - *si as f64).abs() < params.step_tolerance
                        && (a.y - *sj as f64).abs() < params.step_tolerance
                })
                .copied();
            let Some((si, sj)) = step else {
                continue;
            };

            coord[link.index] = Some((ci + si, cj + sj));
            // Hand the axes down, replacing the traversed one with the
            // actual step vector so the basis tracks local perspective.
            let mut nu = u;
            let mut nv = v;
            if si != 0 {
                nu = link.vec * si as f64;
            } else {
                nv = link.vec * sj as f64;
            }
            axes[link.index] = (nu, nv);
            queue.push_back(link.index);
        }
    }

    let mut by_coord: HashMap<(i32, i32), usize> = HashMap::new();
    for (i, c) in coord.iter().enumerate() {
        if let Some(c) = c {
            by_coord.entry(*c).or_insert(i);
        }
    }
    debug!(
        "lattice: {} of {} corners assigned, spacing {:.1} px",
        by_coord.len(),
        points.len(),
        spacing
    );

    let grid = full_rectangle(&by_coord, cols, rows)?;
    let ordered: Vec<Vec<Point2<f64>>> = grid
        .iter()
        .map(|row| row.iter().map(|&i| points[i]).collect())
        .collect();
    Some(canonical_order(ordered, cols == rows))
}

fn seed_axes(links: &[Link]) -> Option<(Vector2<f64>, Vector2<f64>)> {
    let first = links.iter().min_by(|a, b| a.dist.total_cmp(&b.dist))?;
    let u = first.vec;
    let u_unit = u / first.dist;
    let second = links
        .iter()
        .filter(|l| (u_unit.dot(&l.vec) / l.dist).abs() < 0.65)
        .min_by(|a, b| a.dist.total_cmp(&b.dist))?;
    Some((u, second.vec))
}

/// Search the assigned coordinates for a fully populated rectangle of the
/// expected dimensions (either orientation) and return it as `[row][col]`
/// point indices.
fn full_rectangle(
    by_coord: &HashMap<(i32, i32), usize>,
    cols: usize,
    rows: usize,
) -> Option<Vec<Vec<usize>>> {
    if by_coord.len() < cols * rows {
        return None;
    }
    let imin = by_coord.keys().map(|c| c.0).min()?;
    let imax = by_coord.keys().map(|c| c.0).max()?;
    let jmin = by_coord.keys().map(|c| c.1).min()?;
    let jmax = by_coord.keys().map(|c| c.1).max()?;

    let mut dims = vec![(cols as i32, rows as i32)];
    if cols != rows {
        dims.push((rows as i32, cols as i32));
    }

    for (a, b) in dims {
        for i0 in imin..=imax - (a - 1) {
            'origin: for j0 in jmin..=jmax - (b - 1) {
                for di in 0..a {
                    for dj in 0..b {
                        if !by_coord.contains_key(&(i0 + di, j0 + dj)) {
                            continue 'origin;
                        }
                    }
                }
                // i axis carries `a` cells; map to [row][col].
                let mut grid = Vec::with_capacity(rows);
                for r in 0..rows as i32 {
                    let mut row_idx = Vec::with_capacity(cols);
                    for c in 0..cols as i32 {
                        let key = if a == cols as i32 {
                            (i0 + c, j0 + r)
                        } else {
                            (i0 + r, j0 + c)
                        };
                        row_idx.push(by_coord[&key]);
                    }
                    grid.push(row_idx);
                }
                return Some(grid);
            }
        }
    }
    None
}

/// Pick the lexicographically smallest of the equivalent grid traversals:
/// row/column flips, plus the transpose for square grids.
fn canonical_order(grid: Vec<Vec<Point2<f64>>>, allow_transpose: bool) -> Vec<Point2<f64>> {
    let rows = grid.len();
    let cols = grid[0].len();

    let mut variants: Vec<Vec<Point2<f64>>> = Vec::new();
    for flip_r in [false, true] {
        for flip_c in [false, true] {
            let mut flat = Vec::with_capacity(rows * cols);
            for r in 0..rows {
                let rr = if flip_r { rows - 1 - r } else { r };
                for c in 0..cols {
                    let cc = if flip_c { cols - 1 - c } else { c };
                    flat.push(grid[rr][cc]);
                }
            }
            variants.push(flat);
            if allow_transpose {
                let mut flat_t = Vec::with_capacity(rows * cols);
                for c in 0..cols {
                    let cc = if flip_c { cols - 1 - c } else { c };
                    for r in 0..rows {
                        let rr = if flip_r { rows - 1 - r } else { r };
                        flat_t.push(grid[rr][cc]);
                    }
                }
                variants.push(flat_t);
            }
        }
    }

    variants
        .into_iter()
        .min_by(|a, b| {
            for (pa, pb) in a.iter().zip(b.iter()) {
                let ord = pa
                    .x
                    .total_cmp(&pb.x)
                    .then_with(|| pa.y.total_cmp(&pb.y));
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;

    fn project(h: &Matrix3<f64>, x: f64, y: f64) -> Point2<f64> {
        let v = h * nalgebra::Vector3::new(x, y, 1.0);
        Point2::new(v.x / v.z, v.y / v.z)
    }

    fn shuffled(mut pts: Vec<Point2<f64>>) -> Vec<Point2<f64>> {
        // Deterministic scramble; avoids a rand dev-dependency.
        let n = pts.len();
        for i in 0..n {
            let j = (i * 7919 + 13) % n;
            pts.swap(i, j);
        }
        pts
    }

    #[test]
    fn recovers_axis_aligned_grid() {
        let (cols, rows) = (9, 6);
        let mut pts = Vec::new();
        for r in 0..rows {
            for c in 0..cols {
                pts.push(Point2::new(100.0 + 40.0 * c as f64, 80.0 + 40.0 * r as f64));
            }
        }
        let expected = pts.clone();

        let got = index_grid(&shuffled(pts), cols, rows, &LatticeParams::default()).unwrap();
        assert_eq!(got.len(), cols * rows);
        // Canonical order starts at the lexicographically smallest corner,
        // which for this layout is the original row-major order.
        assert_eq!(got, expected);
    }

    #[test]
    fn recovers_grid_under_perspective_with_outliers() {
        let (cols, rows) = (7, 5);
        let h = Matrix3::new(
            38.0, 3.0, 140.0, //
            -2.5, 41.0, 90.0, //
            1.5e-4, -1.2e-4, 1.0,
        );

        let mut pts = Vec::new();
        for r in 0..rows {
            for c in 0..cols {
                pts.push(project(&h, c as f64, r as f64));
            }
        }
        let grid_set = pts.clone();

        // Clutter far away from the lattice.
        pts.push(Point2::new(620.0, 20.0));
        pts.push(Point2::new(15.0, 470.0));
        pts.push(Point2::new(600.0, 460.0));

        let got = index_grid(&shuffled(pts), cols, rows, &LatticeParams::default()).unwrap();
        assert_eq!(got.len(), cols * rows);

        // Same point set, every grid point used exactly once.
        for p in &got {
            assert!(
                grid_set.iter().any(|q| (p - q).norm() < 1e-9),
                "unexpected point {p:?}"
            );
        }
        let mut seen = vec![false; grid_set.len()];
        for p in &got {
            let k = grid_set
                .iter()
                .position(|q| (p - q).norm() < 1e-9)
                .unwrap();
            assert!(!seen[k]);
            seen[k] = true;
        }
    }

    #[test]
    fn ordering_is_row_major_along_short_spacing() {
        let (cols, rows) = (5, 4);
        let mut pts = Vec::new();
        for r in 0..rows {
            for c in 0..cols {
                pts.push(Point2::new(50.0 + 30.0 * c as f64, 60.0 + 30.0 * r as f64));
            }
        }
        let got = index_grid(&shuffled(pts), cols, rows, &LatticeParams::default()).unwrap();
        // Consecutive in-row points are one spacing apart in x.
        for r in 0..rows {
            for c in 0..cols - 1 {
                let a = got[r * cols + c];
                let b = got[r * cols + c + 1];
                assert!((b.x - a.x - 30.0).abs() < 1e-9);
                assert!((b.y - a.y).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn missing_corner_yields_none() {
        let (cols, rows) = (6, 5);
        let mut pts = Vec::new();
        for r in 0..rows {
            for c in 0..cols {
                if (r, c) == (2, 3) {
                    continue; // hole in the middle
                }
                pts.push(Point2::new(40.0 * c as f64, 40.0 * r as f64));
            }
        }
        assert!(index_grid(&pts, cols, rows, &LatticeParams::default()).is_none());
    }

    #[test]
    fn too_few_points_yields_none() {
        let pts = vec![Point2::new(0.0, 0.0); 10];
        assert!(index_grid(&pts, 9, 6, &LatticeParams::default()).is_none());
    }
}
