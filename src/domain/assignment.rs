//! Symbol-to-pixel assignment.
//!
//! Forced pairs are pinned first; the remaining symbols and pixels are
//! matched by an exact rectangular maximum-weight assignment (shortest
//! augmenting path Hungarian method on the negated utilities). Symbols left
//! over receive overflow slots `P, P+1, ...` in ascending symbol order, so
//! the result is total, injective and reproducible.

use std::collections::HashSet;

use super::error::PixelTraderError;
use super::matrix::Matrix;

/// Total symbol -> slot mapping. Slots below `num_pixels` are real pixels,
/// the rest are overflow slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    slots: Vec<usize>,
    num_pixels: usize,
}

impl Assignment {
    /// Build from per-symbol real pixels (`None` = unmatched). Unmatched
    /// symbols get overflow slots in ascending symbol order.
    pub fn from_pixels(
        pixels: &[Option<usize>],
        num_pixels: usize,
    ) -> Result<Self, PixelTraderError> {
        let mut taken = vec![false; num_pixels];
        let mut next_overflow = num_pixels;
        let mut slots = Vec::with_capacity(pixels.len());
        for (j, pixel) in pixels.iter().enumerate() {
            match *pixel {
                Some(p) if p >= num_pixels => {
                    return Err(PixelTraderError::ForcedPixelOutOfRange {
                        symbol: format!("#{j}"),
                        pixel: p,
                        num_pixels,
                    });
                }
                Some(p) => {
                    if taken[p] {
                        return Err(PixelTraderError::DuplicateForced {
                            reason: format!("pixel {p} assigned to more than one symbol"),
                        });
                    }
                    taken[p] = true;
                    slots.push(p);
                }
                None => {
                    slots.push(next_overflow);
                    next_overflow += 1;
                }
            }
        }
        Ok(Assignment { slots, num_pixels })
    }

    /// Rebuild from a persisted `(symbol, slot)` table for the given symbol
    /// universe. Symbols missing from the table, or stored with an overflow
    /// slot, are unmatched.
    pub fn from_table(
        symbols: &[String],
        table: &[(String, usize)],
        num_pixels: usize,
    ) -> Result<Self, PixelTraderError> {
        let pixels: Vec<Option<usize>> = symbols
            .iter()
            .map(|s| {
                table
                    .iter()
                    .find(|(sym, _)| sym == s)
                    .map(|&(_, slot)| slot)
                    .filter(|&slot| slot < num_pixels)
            })
            .collect();
        Assignment::from_pixels(&pixels, num_pixels)
    }

    pub fn num_symbols(&self) -> usize {
        self.slots.len()
    }

    pub fn num_pixels(&self) -> usize {
        self.num_pixels
    }

    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    pub fn slot(&self, symbol: usize) -> usize {
        self.slots[symbol]
    }

    /// Real pixel of a symbol, `None` for an overflow slot.
    pub fn pixel(&self, symbol: usize) -> Option<usize> {
        let slot = self.slots[symbol];
        (slot < self.num_pixels).then_some(slot)
    }

    pub fn matched_count(&self) -> usize {
        self.slots.iter().filter(|&&s| s < self.num_pixels).count()
    }

    /// Per-symbol target weights from one row of pixel weights. Symbols on
    /// overflow slots get zero.
    pub fn symbol_weights(&self, pixel_weights: &[f64]) -> Vec<f64> {
        (0..self.slots.len())
            .map(|j| self.pixel(j).map_or(0.0, |p| pixel_weights[p]))
            .collect()
    }

    /// `(symbol, slot)` rows in symbol order.
    pub fn rows<'a>(&'a self, symbols: &'a [String]) -> impl Iterator<Item = (&'a str, usize)> {
        symbols.iter().map(String::as_str).zip(self.slots.iter().copied())
    }
}

/// Map `(symbol name, pixel)` pairs onto symbol indices. Names not in the
/// universe are skipped.
pub fn resolve_forced(
    symbols: &[String],
    forced: &[(String, usize)],
    num_pixels: usize,
) -> Result<Vec<(usize, usize)>, PixelTraderError> {
    let mut resolved = Vec::with_capacity(forced.len());
    for (name, pixel) in forced {
        if *pixel >= num_pixels {
            return Err(PixelTraderError::ForcedPixelOutOfRange {
                symbol: name.clone(),
                pixel: *pixel,
                num_pixels,
            });
        }
        match symbols.iter().position(|s| s == name) {
            Some(j) => resolved.push((j, *pixel)),
            None => tracing::debug!(symbol = %name, "forced symbol not in universe, skipping"),
        }
    }
    Ok(resolved)
}

/// Solve the assignment for an N x P utility matrix with forced
/// `(symbol index, pixel)` pairs.
pub fn solve_assignment(
    utility: &Matrix,
    forced: &[(usize, usize)],
) -> Result<Assignment, PixelTraderError> {
    let (num_symbols, num_pixels) = utility.shape();

    let mut pixels: Vec<Option<usize>> = vec![None; num_symbols];
    let mut forced_pixels = HashSet::new();
    for &(j, p) in forced {
        if j >= num_symbols {
            return Err(PixelTraderError::ForcedSymbolOutOfRange {
                index: j,
                num_symbols,
            });
        }
        if p >= num_pixels {
            return Err(PixelTraderError::ForcedPixelOutOfRange {
                symbol: format!("#{j}"),
                pixel: p,
                num_pixels,
            });
        }
        if pixels[j].is_some() {
            return Err(PixelTraderError::DuplicateForced {
                reason: format!("symbol #{j} forced more than once"),
            });
        }
        if !forced_pixels.insert(p) {
            return Err(PixelTraderError::DuplicateForced {
                reason: format!("pixel {p} forced more than once"),
            });
        }
        pixels[j] = Some(p);
    }

    let open_rows: Vec<usize> = (0..num_symbols).filter(|&j| pixels[j].is_none()).collect();
    let open_cols: Vec<usize> = (0..num_pixels)
        .filter(|p| !forced_pixels.contains(p))
        .collect();

    if !open_rows.is_empty() && !open_cols.is_empty() {
        let mut cost = Matrix::zeros(open_rows.len(), open_cols.len());
        for (r, &j) in open_rows.iter().enumerate() {
            for (c, &p) in open_cols.iter().enumerate() {
                let u = utility.get(j, p);
                if !u.is_finite() {
                    return Err(PixelTraderError::InvalidUtility { row: j, col: p });
                }
                cost.set(r, c, -u);
            }
        }

        tracing::info!(
            symbols = open_rows.len(),
            pixels = open_cols.len(),
            forced = forced.len(),
            "solving assignment"
        );

        for (r, c) in rectangular_min_cost(&cost) {
            pixels[open_rows[r]] = Some(open_cols[c]);
        }
    }

    let assignment = Assignment::from_pixels(&pixels, num_pixels)?;
    tracing::info!(
        matched = assignment.matched_count(),
        overflow = num_symbols - assignment.matched_count(),
        "assignment solved"
    );
    Ok(assignment)
}

/// Minimum-cost matching of `min(rows, cols)` pairs. Returns `(row, col)`
/// pairs in ascending row order.
fn rectangular_min_cost(cost: &Matrix) -> Vec<(usize, usize)> {
    if cost.rows() <= cost.cols() {
        hungarian(cost)
            .into_iter()
            .enumerate()
            .filter_map(|(r, c)| c.map(|c| (r, c)))
            .collect()
    } else {
        let mut pairs: Vec<(usize, usize)> = hungarian(&cost.transpose())
            .into_iter()
            .enumerate()
            .filter_map(|(c, r)| r.map(|r| (r, c)))
            .collect();
        pairs.sort_unstable();
        pairs
    }
}

/// Shortest augmenting path Hungarian method with row/column potentials,
/// O(n^2 m) for n rows <= m columns. Every row is matched.
fn hungarian(cost: &Matrix) -> Vec<Option<usize>> {
    let (n, m) = cost.shape();
    debug_assert!(n <= m);

    // 1-based; column 0 and row 0 are sentinels.
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    let mut matched_row = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        matched_row[0] = i;
        let mut j0 = 0usize;
        let mut min_v = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];
        loop {
            used[j0] = true;
            let i0 = matched_row[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;
            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let reduced = cost.get(i0 - 1, j - 1) - u[i0] - v[j];
                if reduced < min_v[j] {
                    min_v[j] = reduced;
                    way[j] = j0;
                }
                if min_v[j] < delta {
                    delta = min_v[j];
                    j1 = j;
                }
            }
            for j in 0..=m {
                if used[j] {
                    u[matched_row[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_v[j] -= delta;
                }
            }
            j0 = j1;
            if matched_row[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            matched_row[j0] = matched_row[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut row_to_col = vec![None; n];
    for j in 1..=m {
        if matched_row[j] != 0 {
            row_to_col[matched_row[j] - 1] = Some(j - 1);
        }
    }
    row_to_col
}
