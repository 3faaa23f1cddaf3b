use crate::{concurrency::par_iter_mut1, floating_type_mod::FT, V3, V3I};

pub const DEFAULT_HASH_GRID_RESOLUTION: usize = 64;

/**
 * Cell layout shared by both hash grid variants: points are bucketed by
 * `floor(coord / spacing)` per axis, wrapped modulo a fixed resolution.
 * Far-apart cells that alias under the wrap land in the same bucket; the
 * strict distance filter in the queries makes this only a performance
 * concern, not a correctness one.
 */
#[derive(Clone, Copy, Debug)]
struct HashGridLayout {
    resolution: [usize; 3],
    spacing: FT,
}

impl HashGridLayout {
    fn new(resolution: [usize; 3], spacing: FT) -> HashGridLayout {
        HashGridLayout {
            resolution: [
                resolution[0].max(1),
                resolution[1].max(1),
                resolution[2].max(1),
            ],
            spacing,
        }
    }

    fn bucket_count(&self) -> usize {
        self.resolution[0] * self.resolution[1] * self.resolution[2]
    }

    fn bucket_index(&self, position: V3) -> V3I {
        V3I::new(
            (position.x / self.spacing).floor() as i32,
            (position.y / self.spacing).floor() as i32,
            (position.z / self.spacing).floor() as i32,
        )
    }

    fn key_from_bucket_index(&self, bucket_index: V3I) -> usize {
        let wrap = |idx: i32, res: usize| -> usize {
            let mut wrapped = idx % res as i32;
            if wrapped < 0 {
                wrapped += res as i32;
            }
            wrapped as usize
        };
        let x = wrap(bucket_index.x, self.resolution[0]);
        let y = wrap(bucket_index.y, self.resolution[1]);
        let z = wrap(bucket_index.z, self.resolution[2]);
        (z * self.resolution[1] + y) * self.resolution[0] + x
    }

    fn key_from_position(&self, position: V3) -> usize {
        self.key_from_bucket_index(self.bucket_index(position))
    }

    /**
     * The home cell plus the 7 cells toward the half of the home cell that
     * `origin` falls in. Covers every point within `spacing / 2` of the
     * origin; larger query radii silently under-report.
     */
    fn nearby_keys(&self, origin: V3) -> [usize; 8] {
        let origin_index = self.bucket_index(origin);
        let mut nearby = [origin_index; 8];

        let step_x = if (origin_index.x as FT + 0.5) * self.spacing <= origin.x { 1 } else { -1 };
        let step_y = if (origin_index.y as FT + 0.5) * self.spacing <= origin.y { 1 } else { -1 };
        let step_z = if (origin_index.z as FT + 0.5) * self.spacing <= origin.z { 1 } else { -1 };

        for (i, cell) in nearby.iter_mut().enumerate() {
            if i & 4 != 0 {
                cell.x += step_x;
            }
            if i & 2 != 0 {
                cell.y += step_y;
            }
            if i & 1 != 0 {
                cell.z += step_z;
            }
        }

        let mut keys = [0usize; 8];
        for i in 0..8 {
            keys[i] = self.key_from_bucket_index(nearby[i]);
        }
        keys
    }
}

/**
 * Incremental hash grid. Buckets hold point indices directly, so single
 * points can be appended without a rebuild; emitters use this for
 * overlap rejection while they generate points one at a time.
 */
pub struct PointHashGrid {
    layout: HashGridLayout,
    points: Vec<V3>,
    buckets: Vec<Vec<u32>>,
}

impl PointHashGrid {
    pub fn new(resolution: [usize; 3], grid_spacing: FT) -> PointHashGrid {
        PointHashGrid {
            layout: HashGridLayout::new(resolution, grid_spacing),
            points: Vec::new(),
            buckets: Vec::new(),
        }
    }

    /** Discards all prior state and re-buckets every point. */
    pub fn build(&mut self, points: &[V3]) {
        self.buckets.clear();
        self.buckets.resize(self.layout.bucket_count(), Vec::new());
        self.points.clear();
        self.points.extend_from_slice(points);

        for (i, point) in self.points.iter().enumerate() {
            let key = self.layout.key_from_position(*point);
            self.buckets[key].push(i as u32);
        }
    }

    /** Append one point without rebuilding. */
    pub fn add(&mut self, point: V3) {
        if self.buckets.is_empty() {
            self.build(&[point]);
            return;
        }
        let i = self.points.len();
        self.points.push(point);
        let key = self.layout.key_from_position(point);
        self.buckets[key].push(i as u32);
    }

    pub fn for_each_nearby_point(&self, origin: V3, radius: FT, mut callback: impl FnMut(usize, V3)) {
        if self.buckets.is_empty() {
            return;
        }

        let query_radius_squared = radius * radius;
        for key in self.layout.nearby_keys(origin) {
            for &point_index in &self.buckets[key] {
                let point = self.points[point_index as usize];
                if (point - origin).norm_squared() <= query_radius_squared {
                    callback(point_index as usize, point);
                }
            }
        }
    }

    pub fn has_nearby_point(&self, origin: V3, radius: FT) -> bool {
        if self.buckets.is_empty() {
            return false;
        }

        let query_radius_squared = radius * radius;
        for key in self.layout.nearby_keys(origin) {
            for &point_index in &self.buckets[key] {
                let point = self.points[point_index as usize];
                if (point - origin).norm_squared() <= query_radius_squared {
                    return true;
                }
            }
        }
        false
    }
}

const EMPTY_BUCKET: u32 = u32::MAX;

/**
 * Batch hash grid. `build` sorts all points by cell key once and records
 * per-cell start/end offsets into the sorted order, so the many queries of
 * a pressure-solve sub-step walk compact index ranges instead of chasing
 * per-bucket vectors. Neighbor results are identical to [`PointHashGrid`].
 */
pub struct PointSortedHashGrid {
    layout: HashGridLayout,
    points: Vec<V3>,
    original_indices: Vec<u32>,
    start_index_table: Vec<u32>,
    end_index_table: Vec<u32>,
}

impl PointSortedHashGrid {
    pub fn new(resolution: [usize; 3], grid_spacing: FT) -> PointSortedHashGrid {
        let layout = HashGridLayout::new(resolution, grid_spacing);
        PointSortedHashGrid {
            layout,
            points: Vec::new(),
            original_indices: Vec::new(),
            start_index_table: Vec::new(),
            end_index_table: Vec::new(),
        }
    }

    pub fn build(&mut self, points: &[V3]) {
        let num_points = points.len();

        self.start_index_table.clear();
        self.start_index_table.resize(self.layout.bucket_count(), EMPTY_BUCKET);
        self.end_index_table.clear();
        self.end_index_table.resize(self.layout.bucket_count(), EMPTY_BUCKET);

        if num_points == 0 {
            self.points.clear();
            self.original_indices.clear();
            return;
        }

        let keys: Vec<usize> = points.iter().map(|p| self.layout.key_from_position(*p)).collect();

        let mut order: Vec<u32> = (0..num_points as u32).collect();
        order.sort_by_key(|&i| keys[i as usize]);

        self.points = order.iter().map(|&i| points[i as usize]).collect();
        let sorted_keys: Vec<usize> = order.iter().map(|&i| keys[i as usize]).collect();
        self.original_indices = order;

        self.start_index_table[sorted_keys[0]] = 0;
        self.end_index_table[sorted_keys[num_points - 1]] = num_points as u32;
        for i in 1..num_points {
            if sorted_keys[i] > sorted_keys[i - 1] {
                self.start_index_table[sorted_keys[i]] = i as u32;
                self.end_index_table[sorted_keys[i - 1]] = i as u32;
            }
        }
    }

    pub fn for_each_nearby_point(&self, origin: V3, radius: FT, mut callback: impl FnMut(usize, V3)) {
        if self.points.is_empty() {
            return;
        }

        let query_radius_squared = radius * radius;
        for key in self.layout.nearby_keys(origin) {
            let start = self.start_index_table[key];
            if start == EMPTY_BUCKET {
                continue;
            }
            let end = self.end_index_table[key];

            for j in start..end {
                let point = self.points[j as usize];
                if (point - origin).norm_squared() <= query_radius_squared {
                    callback(self.original_indices[j as usize] as usize, point);
                }
            }
        }
    }

    pub fn has_nearby_point(&self, origin: V3, radius: FT) -> bool {
        let mut found = false;
        self.for_each_nearby_point(origin, radius, |_, _| {
            found = true;
        });
        found
    }
}

/**
 * Per-particle neighbor index lists, rebuilt from the grid right after the
 * grid itself. List `i` holds every particle within the kernel radius of
 * particle `i`, excluding `i`.
 */
pub struct NeighborhoodCache {
    neighs: Vec<Vec<u32>>,
}

impl NeighborhoodCache {
    pub fn new(num_particles: usize) -> NeighborhoodCache {
        NeighborhoodCache {
            neighs: (0..num_particles).map(|_| Vec::new()).collect(),
        }
    }

    pub fn iter(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        self.neighs[i].iter().map(|&x| x as usize)
    }

    pub fn neighbor_count(&self, i: usize) -> usize {
        self.neighs[i].len()
    }

    pub fn len(&self) -> usize {
        self.neighs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighs.is_empty()
    }

    pub fn resize(&mut self, num_particles: usize) {
        self.neighs.resize_with(num_particles, Vec::new);
    }

    pub fn build(&mut self, grid: &PointSortedHashGrid, positions: &[V3], search_radius: FT) {
        self.resize(positions.len());
        par_iter_mut1(&mut self.neighs, |i, neigh_list| {
            neigh_list.clear();
            grid.for_each_nearby_point(positions[i], search_radius, |j, _| {
                if j != i {
                    neigh_list.push(j as u32);
                }
            });
        });
    }
}

#[cfg(test)]
fn brute_force_neighbors(points: &[V3], origin: V3, radius: FT) -> Vec<usize> {
    let mut result: Vec<usize> = points
        .iter()
        .enumerate()
        .filter(|(_, p)| (*p - origin).norm_squared() <= radius * radius)
        .map(|(i, _)| i)
        .collect();
    result.sort();
    result
}

#[cfg(test)]
fn scattered_points(n: usize, extent: FT) -> Vec<V3> {
    use crate::vec3f;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(42);
    (0..n)
        .map(|_| {
            vec3f(
                rng.gen_range(-extent..extent),
                rng.gen_range(-extent..extent),
                rng.gen_range(-extent..extent),
            )
        })
        .collect()
}

#[test]
fn hash_grid_finds_exactly_the_true_neighbors() {
    let spacing = 0.2;
    let radius = spacing / 2.;
    let points = scattered_points(500, 1.0);

    let mut grid = PointHashGrid::new([DEFAULT_HASH_GRID_RESOLUTION; 3], spacing);
    grid.build(&points);

    for &origin in points.iter().step_by(7) {
        let mut found = Vec::new();
        grid.for_each_nearby_point(origin, radius, |j, _| found.push(j));
        found.sort();
        assert_eq!(found, brute_force_neighbors(&points, origin, radius));
    }
}

#[test]
fn sorted_grid_matches_incremental_grid() {
    let spacing = 0.25;
    let radius = spacing / 2.;
    let points = scattered_points(400, 2.0);

    let mut incremental = PointHashGrid::new([DEFAULT_HASH_GRID_RESOLUTION; 3], spacing);
    incremental.build(&points);
    let mut sorted = PointSortedHashGrid::new([DEFAULT_HASH_GRID_RESOLUTION; 3], spacing);
    sorted.build(&points);

    for &origin in points.iter().step_by(11) {
        let mut a = Vec::new();
        incremental.for_each_nearby_point(origin, radius, |j, _| a.push(j));
        let mut b = Vec::new();
        sorted.for_each_nearby_point(origin, radius, |j, _| b.push(j));
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }
}

#[test]
fn hash_grid_query_near_cell_boundary() {
    use crate::vec3f;

    // a point sitting just across a cell boundary from the origin must
    // still be found thanks to the 8-cell enumeration
    let spacing = 1.0;
    let points = vec![vec3f(0.99, 0.5, 0.5), vec3f(1.01, 0.5, 0.5)];
    let mut grid = PointHashGrid::new([DEFAULT_HASH_GRID_RESOLUTION; 3], spacing);
    grid.build(&points);

    let mut found = Vec::new();
    grid.for_each_nearby_point(vec3f(0.99, 0.5, 0.5), 0.5, |j, _| found.push(j));
    found.sort();
    assert_eq!(found, vec![0, 1]);
}

#[test]
fn hash_grid_wraps_negative_cells() {
    use crate::vec3f;

    let spacing = 0.5;
    let points = vec![vec3f(-0.1, -0.1, -0.1), vec3f(-0.3, -0.1, -0.1)];
    let mut grid = PointHashGrid::new([DEFAULT_HASH_GRID_RESOLUTION; 3], spacing);
    grid.build(&points);

    assert!(grid.has_nearby_point(vec3f(-0.2, -0.1, -0.1), 0.25));
    let neighbors = {
        let mut v = Vec::new();
        grid.for_each_nearby_point(vec3f(-0.2, -0.1, -0.1), 0.25, |j, _| v.push(j));
        v.sort();
        v
    };
    assert_eq!(neighbors, vec![0, 1]);
}

#[test]
fn hash_grid_incremental_add() {
    use crate::vec3f;

    let mut grid = PointHashGrid::new([DEFAULT_HASH_GRID_RESOLUTION; 3], 0.5);
    assert!(!grid.has_nearby_point(vec3f(0., 0., 0.), 0.2));

    grid.add(vec3f(0.1, 0., 0.));
    assert!(grid.has_nearby_point(vec3f(0., 0., 0.), 0.2));

    grid.add(vec3f(3., 3., 3.));
    assert!(grid.has_nearby_point(vec3f(3.05, 3., 3.), 0.2));
    assert!(!grid.has_nearby_point(vec3f(5., 5., 5.), 0.2));
}

#[test]
fn neighborhood_cache_excludes_self_and_is_symmetric() {
    use crate::vec3f;

    let radius = 0.1;
    // two particles at the same position plus one out of range
    let positions = vec![vec3f(0.4, 0.4, 0.4), vec3f(0.4, 0.4, 0.4), vec3f(2., 2., 2.)];

    let mut grid = PointSortedHashGrid::new([DEFAULT_HASH_GRID_RESOLUTION; 3], 2. * radius);
    grid.build(&positions);

    let mut cache = NeighborhoodCache::new(positions.len());
    cache.build(&grid, &positions, radius);

    assert_eq!(cache.iter(0).collect::<Vec<_>>(), vec![1]);
    assert_eq!(cache.iter(1).collect::<Vec<_>>(), vec![0]);
    assert_eq!(cache.neighbor_count(2), 0);
}
