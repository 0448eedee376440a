//! Row × column grid and canonical reading-order traversal.

use crate::error::Result;
use crate::model::{Page, PageLayout, Rect};
use crate::parser::Thresholds;

/// Running reading-order state shared by every page of a document.
#[derive(Debug, Clone, Default)]
pub struct OrderCursor {
    next_index: usize,
    block: u32,
    last_column: Option<u16>,
}

impl OrderCursor {
    /// Start a new document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fragments ordered so far.
    pub fn ordered(&self) -> usize {
        self.next_index
    }

    /// Highest reading-order block number issued so far.
    pub fn blocks(&self) -> u32 {
        self.block
    }

    fn advance(&mut self, column: u16) -> (usize, u32) {
        if self.last_column != Some(column) {
            self.block += 1;
            self.last_column = Some(column);
        }
        let index = self.next_index;
        self.next_index += 1;
        (index, self.block)
    }
}

#[derive(Debug, Clone, Default)]
struct Cell {
    /// Fragment index into the page
    occupant: Option<usize>,
    /// The occupant was shifted here from its home cell
    borrowed: bool,
    /// Fragments displaced from this cell, emitted right after the occupant
    followers: Vec<usize>,
}

/// One page's row × column matrix.
///
/// Slot 0 holds full-width fragments; slots 1..=N the detected columns.
#[derive(Debug, Clone)]
pub struct ReadingOrderGrid {
    cells: Vec<Vec<Cell>>,
    slots: usize,
    overflow: usize,
    /// Row starts a new band: the vertical gap above it exceeds the chain limit
    breaks: Vec<bool>,
    /// Degenerate text fragments read right after the grid fragment before them
    riders: Vec<Vec<usize>>,
    /// Degenerate text fragments preceding every grid fragment in input order
    leading: Vec<usize>,
    /// First grid fragment in input order
    first_member: Option<usize>,
    chain_max_gap: f32,
    heading_floor: Option<f32>,
}

impl ReadingOrderGrid {
    /// Build the grid from the page's rows and assigned columns.
    pub fn build(page: &Page, layout: &PageLayout, thresholds: &Thresholds) -> Self {
        let home = |m: usize| page.fragments[m].column().unwrap_or(0) as usize;
        let slots = layout
            .rows
            .iter()
            .flat_map(|r| r.members.iter())
            .map(|m| home(*m) + 1)
            .max()
            .unwrap_or(1)
            .max(layout.column_count() + 1);

        let mut overflow = 0;
        let mut cells = Vec::with_capacity(layout.rows.len());
        for row in &layout.rows {
            let mut line = vec![Cell::default(); slots];
            let mut displaced = Vec::new();
            // Members are sorted by left edge, so the later one is the rightmost
            for &m in &row.members {
                let slot = home(m);
                if line[slot].occupant.is_none() {
                    line[slot].occupant = Some(m);
                } else {
                    displaced.push((slot, m));
                }
            }
            for (slot, m) in displaced {
                line[slot].followers.push(m);
                let shifted = Cell {
                    occupant: Some(m),
                    borrowed: true,
                    followers: Vec::new(),
                };
                match (slot + 1..line.len()).find(|s| line[*s].occupant.is_none()) {
                    Some(free) => line[free] = shifted,
                    None => {
                        line.push(shifted);
                        overflow += 1;
                    }
                }
            }
            cells.push(line);
        }

        let span = |members: &[usize]| {
            members.iter().fold((f32::MAX, f32::MIN), |(top, bottom), m| {
                let f = &page.fragments[*m];
                (top.min(f.rect.top), bottom.max(f.baseline()))
            })
        };
        let spans: Vec<(f32, f32)> = layout.rows.iter().map(|r| span(&r.members)).collect();
        let breaks = (0..spans.len())
            .map(|r| r > 0 && spans[r].0 - spans[r - 1].1 > thresholds.chain_max_gap)
            .collect();

        let mut in_grid = vec![false; page.fragments.len()];
        for m in layout.rows.iter().flat_map(|r| r.members.iter()) {
            in_grid[*m] = true;
        }
        let mut riders = vec![Vec::new(); page.fragments.len()];
        let mut leading = Vec::new();
        let mut host = None;
        for (i, f) in page.fragments.iter().enumerate() {
            if in_grid[i] {
                host = Some(i);
            } else if f.kind.is_text() && f.degenerate {
                match host {
                    Some(h) => riders[h].push(i),
                    None => leading.push(i),
                }
            }
        }

        let body = layout.metrics.body_size;
        Self {
            slots: cells.iter().map(Vec::len).max().unwrap_or(slots),
            cells,
            overflow,
            breaks,
            riders,
            leading,
            first_member: in_grid.iter().position(|g| *g),
            chain_max_gap: thresholds.chain_max_gap,
            heading_floor: (body > 0.0).then(|| body + thresholds.chain_heading_margin),
        }
    }

    /// Number of grid rows.
    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    /// Number of slots, overflow slots included.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Fragments that found no empty cell to their right.
    pub fn overflow(&self) -> usize {
        self.overflow
    }

    fn cell(&self, row: usize, slot: usize) -> Option<&Cell> {
        self.cells.get(row).and_then(|r| r.get(slot))
    }

    /// Home occupant of a cell.
    fn home(&self, row: usize, slot: usize) -> Option<usize> {
        self.cell(row, slot)
            .filter(|c| !c.borrowed)
            .and_then(|c| c.occupant)
    }

    fn full_width(&self, row: usize) -> bool {
        self.home(row, 0).is_some()
    }

    /// Traverse the grid and write the order and block slots of every
    /// fragment in it. Returns page fragment indices in reading order.
    ///
    /// Full-width rows are read as they come. The rows between them form a
    /// band that is read one column at a time, top to bottom.
    pub fn traverse(&self, page: &mut Page, cursor: &mut OrderCursor) -> Result<Vec<usize>> {
        let mut walk = Walk {
            visited: vec![false; page.fragments.len()],
            order: Vec::new(),
        };

        let rows = self.cells.len();
        let mut row = 0;
        while row < rows {
            if self.full_width(row) {
                for slot in 0..self.slots {
                    self.read_slot(row..row + 1, slot, page, cursor, &mut walk)?;
                }
                row += 1;
                continue;
            }
            let mut end = row + 1;
            while end < rows && !self.full_width(end) && !self.breaks[end] {
                end += 1;
            }
            for slot in 0..self.slots {
                self.read_slot(row..end, slot, page, cursor, &mut walk)?;
            }
            row = end;
        }

        // A page without grid fragments still reads its degenerate text
        if self.first_member.is_none() {
            for &rider in &self.leading {
                self.ride(rider, None, page, cursor, &mut walk)?;
            }
        }

        log::trace!(
            "page {}: ordered {} fragments, {} grid rows, {} slots",
            page.number,
            walk.order.len(),
            self.cells.len(),
            self.slots
        );
        Ok(walk.order)
    }

    /// Read one slot of a band, following the column chain from each
    /// unread home cell.
    fn read_slot(
        &self,
        band: std::ops::Range<usize>,
        slot: usize,
        page: &mut Page,
        cursor: &mut OrderCursor,
        walk: &mut Walk,
    ) -> Result<()> {
        let end = band.end;
        for row in band {
            let Some(start) = self.home(row, slot) else {
                continue;
            };
            if walk.visited[start] {
                continue;
            }
            self.emit(row, slot, page, cursor, walk)?;

            let mut current = (row, start);
            while let Some(next) = self
                .chain_step(current, slot, page, &walk.visited)
                .filter(|next| slot == 0 || *next < end)
            {
                let occupant = self.home(next, slot).unwrap_or(start);
                self.emit(next, slot, page, cursor, walk)?;
                current = (next, occupant);
            }
        }
        Ok(())
    }

    /// Next row the chain in `slot` may continue to, if any.
    fn chain_step(
        &self,
        (row, fragment): (usize, usize),
        slot: usize,
        page: &Page,
        visited: &[bool],
    ) -> Option<usize> {
        let current = &page.fragments[fragment];
        if let Some(floor) = self.heading_floor {
            if !current.font_missing && current.font.size > floor {
                return None;
            }
        }

        let next = (row + 1..self.cells.len()).find(|r| self.home(*r, slot).is_some())?;
        let candidate = self.home(next, slot)?;
        if visited[candidate] {
            return None;
        }
        if page.fragments[candidate].rect.top - current.baseline() > self.chain_max_gap {
            return None;
        }

        // Everything the chain would jump over must already be read
        let pending = |r: usize, s: usize| {
            self.cell(r, s)
                .and_then(|c| c.occupant)
                .is_some_and(|m| !visited[m])
        };
        let blocked = (row + 1..next).any(|r| {
            if slot == 0 {
                (0..self.slots).any(|s| pending(r, s))
            } else {
                pending(r, 0) || pending(r, slot)
            }
        });
        (!blocked).then_some(next)
    }

    fn emit(
        &self,
        row: usize,
        slot: usize,
        page: &mut Page,
        cursor: &mut OrderCursor,
        walk: &mut Walk,
    ) -> Result<()> {
        let Some(cell) = self.cell(row, slot) else {
            return Ok(());
        };
        for &m in cell.occupant.iter().chain(cell.followers.iter()) {
            if walk.visited[m] {
                continue;
            }
            if self.first_member == Some(m) {
                for &rider in &self.leading {
                    self.ride(rider, Some(m), page, cursor, walk)?;
                }
            }
            let column = page.fragments[m].column().unwrap_or(0);
            walk.commit(m, column, page, cursor)?;
            for &rider in &self.riders[m] {
                self.ride(rider, Some(m), page, cursor, walk)?;
            }
        }
        Ok(())
    }

    /// Read a degenerate fragment in place of its neighbour `host`.
    fn ride(
        &self,
        rider: usize,
        host: Option<usize>,
        page: &mut Page,
        cursor: &mut OrderCursor,
        walk: &mut Walk,
    ) -> Result<()> {
        if walk.visited[rider] {
            return Ok(());
        }
        let (rect, column) = match host {
            Some(h) => {
                let f = &page.fragments[h];
                (f.rect, f.column().unwrap_or(0))
            }
            None => (Rect::default(), 1),
        };
        page.fragments[rider].adopt_position(rect, column)?;
        walk.commit(rider, column, page, cursor)
    }
}

/// Traversal state of one page.
struct Walk {
    visited: Vec<bool>,
    order: Vec<usize>,
}

impl Walk {
    fn commit(
        &mut self,
        m: usize,
        column: u16,
        page: &mut Page,
        cursor: &mut OrderCursor,
    ) -> Result<()> {
        self.visited[m] = true;
        let fragment = &mut page.fragments[m];
        let (index, block) = cursor.advance(column);
        fragment.assign_order(index)?;
        fragment.assign_ro_block(block)?;
        self.order.push(m);
        Ok(())
    }
}
