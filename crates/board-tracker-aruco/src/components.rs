//! Connected components of dark pixels.
//!
//! Run-length labelling: each row is split into horizontal runs of dark
//! pixels, runs touching a run of the previous row (8-connectivity) are merged
//! with a union-find, and every component keeps its runs so outline fitting
//! can work from row extents without touching the image again.

/// Disjoint-set forest with path halving and union by rank.
struct UnionFind {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size as u32).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, i: u32) -> u32 {
        let mut root = i;
        while self.parent[root as usize] != root {
            self.parent[root as usize] = self.parent[self.parent[root as usize] as usize];
            root = self.parent[root as usize];
        }
        root
    }

    fn union(&mut self, i: u32, j: u32) {
        let (ri, rj) = (self.find(i), self.find(j));
        if ri == rj {
            return;
        }
        match self.rank[ri as usize].cmp(&self.rank[rj as usize]) {
            std::cmp::Ordering::Less => self.parent[ri as usize] = rj,
            std::cmp::Ordering::Greater => self.parent[rj as usize] = ri,
            std::cmp::Ordering::Equal => {
                self.parent[ri as usize] = rj;
                self.rank[rj as usize] += 1;
            }
        }
    }
}

/// Horizontal run of dark pixels `x_start..=x_end` on row `y`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Run {
    pub y: u32,
    pub x_start: u32,
    pub x_end: u32,
}

/// One 8-connected component.
#[derive(Clone, Debug, Default)]
pub struct Component {
    /// Runs in row-major order.
    pub runs: Vec<Run>,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
    pub pixel_count: u32,
}

impl Component {
    #[inline]
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    fn push(&mut self, run: Run) {
        if self.runs.is_empty() {
            self.min_x = run.x_start;
            self.max_x = run.x_end;
            self.min_y = run.y;
            self.max_y = run.y;
        } else {
            self.min_x = self.min_x.min(run.x_start);
            self.max_x = self.max_x.max(run.x_end);
            self.min_y = self.min_y.min(run.y);
            self.max_y = self.max_y.max(run.y);
        }
        self.pixel_count += run.x_end - run.x_start + 1;
        self.runs.push(run);
    }
}

/// Label 8-connected components of non-zero pixels in a binary image.
pub fn label_components(binary: &[u8], width: usize, height: usize) -> Vec<Component> {
    if binary.len() != width * height {
        return Vec::new();
    }

    let mut runs: Vec<Run> = Vec::new();
    let mut row_start: Vec<usize> = Vec::with_capacity(height + 1);
    for y in 0..height {
        row_start.push(runs.len());
        let row = &binary[y * width..(y + 1) * width];
        let mut x = 0;
        while x < width {
            if row[x] == 0 {
                x += 1;
                continue;
            }
            let start = x;
            while x < width && row[x] != 0 {
                x += 1;
            }
            runs.push(Run {
                y: y as u32,
                x_start: start as u32,
                x_end: (x - 1) as u32,
            });
        }
    }
    row_start.push(runs.len());

    if runs.is_empty() {
        return Vec::new();
    }

    let mut uf = UnionFind::new(runs.len());
    for y in 1..height {
        let prev = row_start[y - 1]..row_start[y];
        let curr = row_start[y]..row_start[y + 1];
        let mut p = prev.start;
        for c in curr {
            let run = runs[c];
            // Skip previous-row runs ending left of the diagonal neighbour.
            while p < prev.end && runs[p].x_end + 1 < run.x_start {
                p += 1;
            }
            let mut q = p;
            while q < prev.end && runs[q].x_start <= run.x_end + 1 {
                uf.union(c as u32, q as u32);
                q += 1;
            }
        }
    }

    let mut root_to_component = vec![u32::MAX; runs.len()];
    let mut components: Vec<Component> = Vec::new();
    for (i, run) in runs.iter().enumerate() {
        let root = uf.find(i as u32) as usize;
        if root_to_component[root] == u32::MAX {
            root_to_component[root] = components.len() as u32;
            components.push(Component::default());
        }
        components[root_to_component[root] as usize].push(*run);
    }

    components
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_from_rows(rows: &[&str]) -> (Vec<u8>, usize, usize) {
        let h = rows.len();
        let w = rows[0].len();
        let data = rows
            .iter()
            .flat_map(|r| r.bytes().map(|b| u8::from(b == b'#')))
            .collect();
        (data, w, h)
    }

    #[test]
    fn separate_blobs_get_separate_components() {
        let (bin, w, h) = binary_from_rows(&[
            "##....", //
            "##..##", //
            "....##", //
        ]);
        let comps = label_components(&bin, w, h);
        assert_eq!(comps.len(), 2);
        assert!(comps.iter().all(|c| c.pixel_count == 4));
    }

    #[test]
    fn diagonal_neighbours_are_connected() {
        let (bin, w, h) = binary_from_rows(&[
            "#...", //
            ".#..", //
            "..#.", //
            "...#", //
        ]);
        let comps = label_components(&bin, w, h);
        assert_eq!(comps.len(), 1);
        assert_eq!((comps[0].width(), comps[0].height()), (4, 4));
    }

    #[test]
    fn u_shape_merges_into_one_component() {
        let (bin, w, h) = binary_from_rows(&[
            "#...#", //
            "#...#", //
            "#####", //
        ]);
        let comps = label_components(&bin, w, h);
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].pixel_count, 9);
        assert_eq!(comps[0].runs.len(), 5);
    }

    #[test]
    fn empty_image_has_no_components() {
        assert!(label_components(&[0; 12], 4, 3).is_empty());
        assert!(label_components(&[1; 5], 4, 3).is_empty());
    }
}
