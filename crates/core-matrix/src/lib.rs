//! Dynamic-programming matrices for Plan 7 alignment.
//!
//! One [`DpMatrix`] holds the three main grids (match/insert/delete) plus the
//! special-state grid, all as single owned buffers with row-stride indexing.
//! Matrices are created once per worker and reused across (sequence, model)
//! pairs; growth is padded so repeated resizes amortize. Row contents are not
//! preserved across a resize — every algorithm fully initializes the rows it
//! reads.

use tracing::debug;

/// Soft memory cap in MB. Above this, the full-matrix Viterbi gives way to
/// the linear-memory variant.
pub const RAMLIMIT_MB: usize = 32;

/// Column indices into the special-state grid.
pub const XMB: usize = 0;
pub const XME: usize = 1;
pub const XMC: usize = 2;
pub const XMJ: usize = 3;
pub const XMN: usize = 4;
/// Width of the special-state grid.
pub const XCOLS: usize = 5;

/// A rectangular grid of integer scores, rows x cols, one contiguous buffer.
#[derive(Debug, Clone)]
pub struct Grid {
    rows: usize,
    cols: usize,
    data: Vec<i32>,
}

impl Grid {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[i32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [i32] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    #[inline]
    pub fn get(&self, i: usize, k: usize) -> i32 {
        self.data[i * self.cols + k]
    }

    #[inline]
    pub fn set(&mut self, i: usize, k: usize, v: i32) {
        self.data[i * self.cols + k] = v;
    }

    /// Borrow row `i-1` immutably and row `i` mutably at once, for the
    /// pull-style recurrences that read the previous row while writing the
    /// current one.
    #[inline]
    pub fn prev_cur(&mut self, i: usize) -> (&[i32], &mut [i32]) {
        debug_assert!(i >= 1 && i < self.rows);
        let (head, tail) = self.data.split_at_mut(i * self.cols);
        (
            &head[(i - 1) * self.cols..],
            &mut tail[..self.cols],
        )
    }

    fn resize(&mut self, rows: usize, cols: usize) {
        self.rows = rows;
        self.cols = cols;
        self.data.clear();
        self.data.resize(rows * cols, 0);
    }
}

/// Score grids for rows 0..=max_n and model nodes 0..=max_m (+1 spare column
/// so the divide-and-conquer sweeps may read node `k3+1`).
#[derive(Debug)]
pub struct DpMatrix {
    max_n: usize,
    max_m: usize,
    pad_n: usize,
    pad_m: usize,
    pub mmx: Grid,
    pub imx: Grid,
    pub dmx: Grid,
    pub xmx: Grid,
}

impl DpMatrix {
    /// A matrix covering sequences up to length `n` and models up to length
    /// `m`, with growth padding hints.
    pub fn new(n: usize, m: usize, pad_n: usize, pad_m: usize) -> Self {
        Self {
            max_n: n,
            max_m: m,
            pad_n,
            pad_m,
            mmx: Grid::new(n + 1, m + 2),
            imx: Grid::new(n + 1, m + 2),
            dmx: Grid::new(n + 1, m + 2),
            xmx: Grid::new(n + 1, XCOLS),
        }
    }

    /// A two-row matrix for the linear-memory algorithms.
    pub fn two_rows(m: usize) -> Self {
        Self::new(1, m, 0, 0)
    }

    pub fn max_n(&self) -> usize {
        self.max_n
    }

    pub fn max_m(&self) -> usize {
        self.max_m
    }

    /// Grow to cover (n, m), applying pads on any dimension that grows.
    /// Never shrinks.
    pub fn resize(&mut self, n: usize, m: usize) {
        if n <= self.max_n && m <= self.max_m {
            return;
        }
        if n > self.max_n {
            self.max_n = n + self.pad_n;
        }
        if m > self.max_m {
            self.max_m = m + self.pad_m;
        }
        debug!(
            target: "dp.matrix",
            max_n = self.max_n,
            max_m = self.max_m,
            "resize"
        );
        self.mmx.resize(self.max_n + 1, self.max_m + 2);
        self.imx.resize(self.max_n + 1, self.max_m + 2);
        self.dmx.resize(self.max_n + 1, self.max_m + 2);
        self.xmx.resize(self.max_n + 1, XCOLS);
    }

    /// Would running full Viterbi on (l, m) keep this matrix under
    /// `limit_mb`, after any padded growth it would trigger?
    pub fn space_ok(&self, l: usize, m: usize, limit_mb: usize) -> bool {
        if m <= self.max_m && l <= self.max_n {
            return true;
        }
        let new_m = if m > self.max_m { m + self.pad_m } else { self.max_m };
        let new_n = if l > self.max_n { l + self.pad_n } else { self.max_n };
        viterbi_size_mb(new_n, new_m) <= limit_mb
    }
}

/// Memory needed for a full (l+1) x (m+2) matrix, in MB. The three main
/// grids dominate; the special grid and struct overhead are counted anyway.
pub fn viterbi_size_mb(l: usize, m: usize) -> usize {
    let mut bytes = std::mem::size_of::<DpMatrix>() as f64;
    bytes += 3.0 * (l + 1) as f64 * (m + 2) as f64 * std::mem::size_of::<i32>() as f64;
    bytes += XCOLS as f64 * (l + 1) as f64 * std::mem::size_of::<i32>() as f64;
    (bytes / 1_048_576.0) as usize
}
