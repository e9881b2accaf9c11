//! Tile-grid pathfinding over the static world map.
//!
//! The grid is derived once from the tile map (rebuild it if the map ever
//! changes): a cell is blocked iff the source tile is the void code 0, every
//! other tile code is traversable. Paths are computed with A* over the
//! 4-connected grid and translated back to tile-aligned pixel waypoints.

use shared::TILE_SIZE;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Traversability grid shared read-only by movement, follow and
/// click-to-move handling.
#[derive(Debug, Clone)]
pub struct Grid {
    width: usize,
    height: usize,
    blocked: Vec<bool>,
}

#[derive(Copy, Clone, Eq, PartialEq)]
struct Node {
    cost: i32,
    x: usize,
    y: usize,
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.cmp(&self.cost) // min-heap via reversed ordering
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Grid {
    /// Builds the traversability grid from the world's tile matrix.
    /// Ragged rows are padded with blocked cells.
    pub fn from_tile_map(map: &[Vec<u8>]) -> Grid {
        let height = map.len();
        let width = map.iter().map(|row| row.len()).max().unwrap_or(0);

        let mut blocked = vec![true; width * height];
        for (y, row) in map.iter().enumerate() {
            for x in 0..width {
                blocked[y * width + x] = row.get(x).copied().unwrap_or(0) == 0;
            }
        }

        Grid {
            width,
            height,
            blocked,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns true if the tile at (tx, ty) is on the grid and traversable.
    pub fn is_walkable(&self, tx: i32, ty: i32) -> bool {
        if tx < 0 || ty < 0 {
            return false;
        }
        let (tx, ty) = (tx as usize, ty as usize);
        tx < self.width && ty < self.height && !self.blocked[ty * self.width + tx]
    }

    /// Returns true if the tile containing the pixel position is traversable.
    pub fn is_walkable_pixel(&self, x: i32, y: i32) -> bool {
        self.is_walkable(x.div_euclid(TILE_SIZE), y.div_euclid(TILE_SIZE))
    }

    /// Broadcast form of the grid: 0 for walkable cells, 1 for blocked.
    pub fn matrix(&self) -> Vec<Vec<u8>> {
        (0..self.height)
            .map(|y| {
                (0..self.width)
                    .map(|x| u8::from(self.blocked[y * self.width + x]))
                    .collect()
            })
            .collect()
    }

    /// Shortest path between two pixel positions.
    ///
    /// Pixel coordinates map to tiles by integer division by [`TILE_SIZE`];
    /// the resulting tile sequence (start tile included) maps back to pixel
    /// waypoints by multiplication. Returns an empty sequence when no path
    /// exists or when both positions land on the same tile — callers treat
    /// empty as "no path", never as an error.
    pub fn find_path(&self, from_x: i32, from_y: i32, to_x: i32, to_y: i32) -> Vec<(i32, i32)> {
        let start_tx = from_x.div_euclid(TILE_SIZE);
        let start_ty = from_y.div_euclid(TILE_SIZE);
        let end_tx = to_x.div_euclid(TILE_SIZE);
        let end_ty = to_y.div_euclid(TILE_SIZE);

        if start_tx == end_tx && start_ty == end_ty {
            return Vec::new();
        }
        if !self.is_walkable(start_tx, start_ty) || !self.is_walkable(end_tx, end_ty) {
            return Vec::new();
        }

        let (start_tx, start_ty) = (start_tx as usize, start_ty as usize);
        let (end_tx, end_ty) = (end_tx as usize, end_ty as usize);

        let w = self.width;
        let size = w * self.height;

        let mut g_score = vec![i32::MAX; size];
        let mut came_from = vec![usize::MAX; size];
        let mut closed = vec![false; size];

        let start_idx = start_ty * w + start_tx;
        let end_idx = end_ty * w + end_tx;
        g_score[start_idx] = 0;

        let heuristic = |tx: usize, ty: usize| -> i32 {
            let dx = (tx as i32 - end_tx as i32).abs();
            let dy = (ty as i32 - end_ty as i32).abs();
            dx + dy // Manhattan distance
        };

        let mut open = BinaryHeap::new();
        open.push(Node {
            cost: heuristic(start_tx, start_ty),
            x: start_tx,
            y: start_ty,
        });

        // 4-directional neighbors; diagonal steps are never produced
        let dirs: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

        while let Some(current) = open.pop() {
            let cidx = current.y * w + current.x;

            if cidx == end_idx {
                // Reconstruct tile path back to the start, then emit
                // pixel waypoints in walk order.
                let mut tiles = vec![end_idx];
                let mut idx = end_idx;
                while idx != start_idx {
                    idx = came_from[idx];
                    tiles.push(idx);
                }
                tiles.reverse();
                return tiles
                    .into_iter()
                    .map(|idx| {
                        let tx = (idx % w) as i32;
                        let ty = (idx / w) as i32;
                        (tx * TILE_SIZE, ty * TILE_SIZE)
                    })
                    .collect();
            }

            if closed[cidx] {
                continue;
            }
            closed[cidx] = true;

            let current_g = g_score[cidx];

            for (dx, dy) in &dirs {
                let nx = current.x as i32 + dx;
                let ny = current.y as i32 + dy;
                if !self.is_walkable(nx, ny) {
                    continue;
                }

                let nidx = ny as usize * w + nx as usize;
                if closed[nidx] {
                    continue;
                }

                let tentative_g = current_g + 1;
                if tentative_g < g_score[nidx] {
                    g_score[nidx] = tentative_g;
                    came_from[nidx] = cidx;
                    open.push(Node {
                        cost: tentative_g + heuristic(nx as usize, ny as usize),
                        x: nx as usize,
                        y: ny as usize,
                    });
                }
            }
        }

        Vec::new()
    }
}
