use itertools::{Itertools, iproduct};
use rand::Rng;
use rand::prelude::IndexedRandom;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// A single board position, addressed row-first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

/// A logical statement about the board: "exactly `count` of `cells` are mines."
///
/// Sentences only ever talk about cells whose state is still undetermined.
/// Once a cell is classified, it is removed from every sentence (with the
/// count adjusted for mines), so the two fields always satisfy
/// `count <= cells.len()`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Sentence {
    cells: BTreeSet<Cell>,
    count: usize,
}

impl Sentence {
    pub fn new(cells: BTreeSet<Cell>, count: usize) -> Self {
        assert!(
            count <= cells.len(),
            "sentence claims {} mines among {} cells",
            count,
            cells.len()
        );
        Sentence { cells, count }
    }

    pub fn cells(&self) -> &BTreeSet<Cell> {
        &self.cells
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// A sentence with no cells left carries no information.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// All of `cells`, if every one of them must be a mine. That is the
    /// case exactly when the mine count equals the number of cells; no
    /// partial certainty is ever reported.
    pub fn known_mines(&self) -> Option<&BTreeSet<Cell>> {
        (self.count > 0 && self.count == self.cells.len()).then_some(&self.cells)
    }

    /// All of `cells`, if every one of them must be safe.
    pub fn known_safes(&self) -> Option<&BTreeSet<Cell>> {
        (self.count == 0 && !self.cells.is_empty()).then_some(&self.cells)
    }

    /// Accounts for a cell proven to be a mine: the cell leaves the
    /// sentence and the count drops by one. No-op if the cell is absent.
    pub fn mark_mine(&mut self, cell: Cell) {
        if self.cells.remove(&cell) {
            assert!(
                self.count > 0,
                "contradictory knowledge: mine marked in a zero-count sentence"
            );
            self.count -= 1;
        }
    }

    /// Accounts for a cell proven safe: it leaves the sentence and the
    /// count is unchanged. No-op if the cell is absent.
    pub fn mark_safe(&mut self, cell: Cell) {
        self.cells.remove(&cell);
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells = self
            .cells
            .iter()
            .map(|c| format!("({}, {})", c.row, c.col))
            .join(", ");
        write!(f, "{{{}}} = {}", cells, self.count)
    }
}

/// The knowledge-based Minesweeper player.
///
/// The agent never sees the board itself. The driver that owns the board
/// reveals one cell at a time and reports the revealed cell together with
/// its neighbor mine count via [`Agent::add_knowledge`]; the agent turns
/// each observation into a sentence and runs its knowledge to a deductive
/// fixed point. [`Agent::safe_move`] and [`Agent::random_move`] then answer
/// the driver's "what next?" question.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Agent {
    height: usize,
    width: usize,
    /// Cells the agent has already revealed. Grows monotonically.
    moves_made: BTreeSet<Cell>,
    /// Cells known with certainty to contain a mine.
    mines: BTreeSet<Cell>,
    /// Cells known with certainty to be mine-free.
    safes: BTreeSet<Cell>,
    /// Currently-unresolved constraints. A sentence is dropped once it has
    /// been fully resolved into `mines` and `safes`.
    knowledge: Vec<Sentence>,
}

impl Agent {
    pub fn new(height: usize, width: usize) -> Self {
        if height == 0 || width == 0 {
            panic!("Board dimensions must be non-zero.");
        }
        Agent {
            height,
            width,
            moves_made: BTreeSet::new(),
            mines: BTreeSet::new(),
            safes: BTreeSet::new(),
            knowledge: Vec::new(),
        }
    }

    /// Deserializes agent state from bytes.
    pub fn deserialize(bts: &[u8]) -> Self {
        bcs::from_bytes(bts).unwrap()
    }

    /// Serializes the agent state to bytes.
    pub fn serialize(&self) -> Vec<u8> {
        bcs::to_bytes(self).unwrap()
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn mines(&self) -> &BTreeSet<Cell> {
        &self.mines
    }

    pub fn safes(&self) -> &BTreeSet<Cell> {
        &self.safes
    }

    pub fn moves_made(&self) -> &BTreeSet<Cell> {
        &self.moves_made
    }

    pub fn knowledge(&self) -> &[Sentence] {
        &self.knowledge
    }

    /// Records that `cell` was revealed safely with `count` mines among its
    /// neighbors, then draws every conclusion the accumulated knowledge
    /// supports.
    ///
    /// The steps:
    /// 1. Validate the observation against the grid and existing knowledge.
    /// 2. Record the move and mark the cell safe everywhere it appears.
    /// 3. Build a new sentence over the still-undetermined neighbors, with
    ///    the count adjusted for neighbors already known to be mines.
    /// 4. Run the inference loop to a fixed point.
    ///
    /// Errors are caller contract violations (out-of-bounds cell, a count
    /// that cannot fit the cell's neighborhood, or an observation that
    /// contradicts established knowledge) and leave the agent untouched.
    pub fn add_knowledge(&mut self, cell: Cell, count: u8) -> anyhow::Result<()> {
        if !self.in_bounds(cell) {
            anyhow::bail!(
                "cell ({}, {}) is outside the {}x{} grid",
                cell.row,
                cell.col,
                self.height,
                self.width
            );
        }
        if self.mines.contains(&cell) {
            anyhow::bail!(
                "cell ({}, {}) is a known mine and cannot be revealed safely",
                cell.row,
                cell.col
            );
        }

        let neighbors: Vec<Cell> = self.neighbors(cell).collect();
        if usize::from(count) > neighbors.len() {
            anyhow::bail!(
                "count {} exceeds the {} neighbors of ({}, {})",
                count,
                neighbors.len(),
                cell.row,
                cell.col
            );
        }

        // Only cells whose state is still undetermined belong in the new
        // sentence; neighbors already known to be mines come off the count.
        let mut unknown = BTreeSet::new();
        let mut remaining = usize::from(count);
        for neighbor in neighbors {
            if self.safes.contains(&neighbor) {
                continue;
            }
            if self.mines.contains(&neighbor) {
                remaining = remaining.checked_sub(1).ok_or_else(|| {
                    anyhow::anyhow!(
                        "count {} at ({}, {}) contradicts the known mines around it",
                        count,
                        cell.row,
                        cell.col
                    )
                })?;
                continue;
            }
            unknown.insert(neighbor);
        }
        anyhow::ensure!(
            remaining <= unknown.len(),
            "count {} at ({}, {}) cannot fit its {} undetermined neighbors",
            count,
            cell.row,
            cell.col,
            unknown.len()
        );

        self.moves_made.insert(cell);
        self.mark_safe(cell);

        if !unknown.is_empty() {
            let sentence = Sentence::new(unknown, remaining);
            debug!(%sentence, "observed");
            self.knowledge.push(sentence);
        }

        self.infer();
        Ok(())
    }

    /// A cell known to be safe that has not been revealed yet, if any.
    /// Which one is returned when several qualify is unspecified.
    pub fn safe_move(&self) -> Option<Cell> {
        self.safes.difference(&self.moves_made).next().copied()
    }

    /// A uniformly random cell that has not been revealed and is not a
    /// known mine. `None` once no such cell is left, which the driver
    /// should treat as the game being over.
    pub fn random_move<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Cell> {
        let candidates: Vec<Cell> = iproduct!(0..self.height, 0..self.width)
            .map(|(row, col)| Cell { row, col })
            .filter(|cell| !self.moves_made.contains(cell) && !self.mines.contains(cell))
            .collect();
        candidates.choose(rng).copied()
    }

    fn in_bounds(&self, cell: Cell) -> bool {
        cell.row < self.height && cell.col < self.width
    }

    /// All in-bounds cells within one row and column of `cell`, the cell
    /// itself excluded. Handles board edges and corners.
    fn neighbors(&self, cell: Cell) -> impl Iterator<Item = Cell> {
        let height = self.height;
        let width = self.width;

        (-1..=1).flat_map(move |dr: isize| {
            (-1..=1).filter_map(move |dc: isize| {
                if dr == 0 && dc == 0 {
                    return None;
                }

                let row = cell.row as isize + dr;
                let col = cell.col as isize + dc;

                if row >= 0 && row < height as isize && col >= 0 && col < width as isize {
                    Some(Cell {
                        row: row as usize,
                        col: col as usize,
                    })
                } else {
                    None
                }
            })
        })
    }

    /// Classifies `cell` as a mine and removes it from every sentence.
    fn mark_mine(&mut self, cell: Cell) {
        if self.mines.insert(cell) {
            for sentence in &mut self.knowledge {
                sentence.mark_mine(cell);
            }
        }
    }

    /// Classifies `cell` as safe and removes it from every sentence.
    fn mark_safe(&mut self, cell: Cell) {
        if self.safes.insert(cell) {
            for sentence in &mut self.knowledge {
                sentence.mark_safe(cell);
            }
        }
    }

    /// Runs the two inference rules until a full pass changes nothing.
    ///
    /// Each pass: resolve every fully-determined sentence into `mines` and
    /// `safes` (cascading the classification through all other sentences),
    /// drop sentences that have become empty, then derive new sentences by
    /// subset elimination. Termination is guaranteed on a finite board:
    /// classifications only shrink sentences, and only finitely many
    /// distinct sentences exist.
    fn infer(&mut self) {
        loop {
            let mut changed = false;

            // Direct resolution.
            let mut found_mines = Vec::new();
            let mut found_safes = Vec::new();
            for sentence in &self.knowledge {
                if let Some(cells) = sentence.known_mines() {
                    found_mines.extend(cells.iter().copied());
                } else if let Some(cells) = sentence.known_safes() {
                    found_safes.extend(cells.iter().copied());
                }
            }
            for cell in found_mines {
                if !self.mines.contains(&cell) {
                    debug!(row = cell.row, col = cell.col, "deduced mine");
                    self.mark_mine(cell);
                    changed = true;
                }
            }
            for cell in found_safes {
                if !self.safes.contains(&cell) {
                    debug!(row = cell.row, col = cell.col, "deduced safe");
                    self.mark_safe(cell);
                    changed = true;
                }
            }

            // Fully resolved sentences carry no further information.
            self.knowledge.retain(|sentence| !sentence.is_empty());

            // Subset elimination: if every cell of `a` lies inside `b`, the
            // cells of `b` outside `a` must hold the remaining
            // `b.count - a.count` mines.
            let mut derived = Vec::new();
            for (i, j) in (0..self.knowledge.len()).tuple_combinations() {
                for (small, large) in [(i, j), (j, i)] {
                    let (a, b) = (&self.knowledge[small], &self.knowledge[large]);
                    if a.cells.len() < b.cells.len() && a.cells.is_subset(&b.cells) {
                        let cells: BTreeSet<Cell> = b.cells.difference(&a.cells).copied().collect();
                        let count = b
                            .count
                            .checked_sub(a.count)
                            .expect("contradictory knowledge: subset sentence with a larger count");
                        derived.push(Sentence::new(cells, count));
                    }
                }
            }
            for sentence in derived {
                if !self.knowledge.contains(&sentence) {
                    debug!(%sentence, "derived by subset elimination");
                    self.knowledge.push(sentence);
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(row: usize, col: usize) -> Cell {
        Cell { row, col }
    }

    fn sentence(cells: &[Cell], count: usize) -> Sentence {
        Sentence::new(cells.iter().copied().collect(), count)
    }

    #[test]
    fn test_agent_initialization() {
        // A fresh agent knows nothing about the board.
        let agent = Agent::new(5, 4);
        assert_eq!(agent.height(), 5);
        assert_eq!(agent.width(), 4);
        assert!(agent.moves_made().is_empty());
        assert!(agent.mines().is_empty());
        assert!(agent.safes().is_empty());
        assert!(agent.knowledge().is_empty());
    }

    #[test]
    #[should_panic(expected = "Board dimensions must be non-zero.")]
    fn test_agent_initialization_zero_sized() {
        Agent::new(0, 5);
    }

    #[test]
    fn test_sentence_known_mines_and_safes() {
        // A count equal to the cell count means every cell is a mine; a
        // zero count means every cell is safe; anything in between yields
        // no certainty at all.
        let full = sentence(&[cell(0, 0), cell(0, 1)], 2);
        assert_eq!(full.known_mines().map(|s| s.len()), Some(2));
        assert_eq!(full.known_safes(), None);

        let clear = sentence(&[cell(0, 0), cell(0, 1), cell(0, 2)], 0);
        assert_eq!(clear.known_safes().map(|s| s.len()), Some(3));
        assert_eq!(clear.known_mines(), None);

        let partial = sentence(&[cell(0, 0), cell(0, 1)], 1);
        assert_eq!(partial.known_mines(), None);
        assert_eq!(partial.known_safes(), None);
    }

    #[test]
    fn test_sentence_marking_is_idempotent() {
        // Marking a cell that has already left the sentence must change
        // nothing, no matter how often it is repeated.
        let mut s = sentence(&[cell(0, 0), cell(0, 1), cell(0, 2)], 2);

        s.mark_mine(cell(0, 0));
        assert_eq!(s.count(), 1);
        assert_eq!(s.cells().len(), 2);

        s.mark_mine(cell(0, 0));
        assert_eq!(s.count(), 1);
        assert_eq!(s.cells().len(), 2);

        s.mark_safe(cell(0, 1));
        assert_eq!(s.count(), 1);
        assert_eq!(s.cells().len(), 1);

        s.mark_safe(cell(0, 1));
        s.mark_safe(cell(5, 5));
        assert_eq!(s.count(), 1);
        assert_eq!(s.cells().len(), 1);
    }

    #[test]
    fn test_sentence_equality_ignores_insertion_order() {
        let a = sentence(&[cell(0, 0), cell(1, 1), cell(2, 2)], 1);
        let b = sentence(&[cell(2, 2), cell(0, 0), cell(1, 1)], 1);
        assert_eq!(a, b);
        assert_ne!(a, sentence(&[cell(0, 0), cell(1, 1), cell(2, 2)], 2));
    }

    #[test]
    fn test_neighbor_clipping() {
        // Corner cells have 3 neighbors, edge cells 5, interior cells 8.
        let agent = Agent::new(3, 3);
        assert_eq!(agent.neighbors(cell(0, 0)).count(), 3);
        assert_eq!(agent.neighbors(cell(1, 0)).count(), 5);
        assert_eq!(agent.neighbors(cell(1, 1)).count(), 8);
    }

    #[test]
    fn test_rejects_out_of_bounds_cell() {
        let mut agent = Agent::new(3, 3);
        assert!(agent.add_knowledge(cell(3, 0), 0).is_err());
        assert!(agent.add_knowledge(cell(0, 3), 0).is_err());
        assert!(agent.moves_made().is_empty());
    }

    #[test]
    fn test_rejects_oversized_count() {
        // An interior cell has only 8 neighbors; a corner cell only 3.
        let mut agent = Agent::new(3, 3);
        assert!(agent.add_knowledge(cell(1, 1), 9).is_err());
        assert!(agent.add_knowledge(cell(0, 0), 4).is_err());
        assert!(agent.moves_made().is_empty());
        assert!(agent.knowledge().is_empty());
    }

    #[test]
    fn test_rejects_revealing_a_known_mine() {
        // On a 1x2 strip, revealing the left cell with count 1 proves the
        // right cell is a mine. Claiming it was then revealed safely is a
        // contradiction and must not disturb the agent's state.
        let mut agent = Agent::new(1, 2);
        agent.add_knowledge(cell(0, 0), 1).unwrap();
        assert!(agent.mines().contains(&cell(0, 1)));

        assert!(agent.add_knowledge(cell(0, 1), 0).is_err());
        assert!(!agent.moves_made().contains(&cell(0, 1)));
        assert!(agent.mines().contains(&cell(0, 1)));
    }

    #[test]
    fn test_direct_resolution_all_mines() {
        // Revealing the center of a 3x3 board with count 8 pins a mine on
        // every surrounding cell.
        let mut agent = Agent::new(3, 3);
        agent.add_knowledge(cell(1, 1), 8).unwrap();
        assert_eq!(agent.mines().len(), 8);
        assert!(!agent.mines().contains(&cell(1, 1)));
    }

    #[test]
    fn test_direct_resolution_all_safes() {
        // A zero count clears the whole neighborhood.
        let mut agent = Agent::new(3, 3);
        agent.add_knowledge(cell(1, 1), 0).unwrap();
        assert_eq!(agent.safes().len(), 9);
        assert!(agent.mines().is_empty());
        // Everything resolved, nothing left to carry.
        assert!(agent.knowledge().is_empty());
    }

    #[test]
    fn test_subset_elimination() {
        // {a, b} = 1 inside {a, b, c} = 2 leaves {c} = 1: cell c is a
        // mine, while a and b stay undetermined.
        let (a, b, c) = (cell(0, 0), cell(0, 1), cell(0, 2));
        let mut agent = Agent::new(1, 3);
        agent.knowledge.push(sentence(&[a, b], 1));
        agent.knowledge.push(sentence(&[a, b, c], 2));

        agent.infer();

        assert!(agent.mines().contains(&c));
        assert!(!agent.mines().contains(&a));
        assert!(!agent.mines().contains(&b));
        assert!(agent.safes().is_empty());
    }

    #[test]
    fn test_sentences_never_reference_classified_cells() {
        let (a, b, c) = (cell(0, 0), cell(0, 1), cell(0, 2));
        let mut agent = Agent::new(1, 3);
        agent.knowledge.push(sentence(&[a, b], 1));
        agent.knowledge.push(sentence(&[a, b, c], 2));

        agent.infer();

        for s in agent.knowledge() {
            for classified in agent.mines().union(agent.safes()) {
                assert!(!s.cells().contains(classified));
            }
            assert!(s.count() <= s.cells().len());
        }
    }

    #[test]
    fn test_end_to_end_strip() {
        // 1x4 board with a single mine in the last cell. Observations on
        // the three safe cells must pin the mine exactly, with no guessing
        // left to do.
        let mut agent = Agent::new(1, 4);

        agent.add_knowledge(cell(0, 0), 0).unwrap();
        assert_eq!(agent.safe_move(), Some(cell(0, 1)));

        agent.add_knowledge(cell(0, 1), 0).unwrap();
        assert_eq!(agent.safe_move(), Some(cell(0, 2)));

        agent.add_knowledge(cell(0, 2), 1).unwrap();
        assert_eq!(
            agent.mines().iter().copied().collect::<Vec<_>>(),
            vec![cell(0, 3)]
        );
        for col in 0..3 {
            assert!(agent.safes().contains(&cell(0, col)));
        }

        // All safe cells explored, the mine known: no move of either kind.
        assert_eq!(agent.safe_move(), None);
        assert_eq!(agent.random_move(&mut rand::rng()), None);

        // The derived sets never overlap.
        assert!(agent.mines().intersection(agent.safes()).next().is_none());
    }

    #[test]
    fn test_termination_on_full_board() {
        // Exercising every cell of a mine-free board runs every closure
        // pass to completion and resolves the entire grid.
        let mut agent = Agent::new(3, 3);
        for row in 0..3 {
            for col in 0..3 {
                agent.add_knowledge(cell(row, col), 0).unwrap();
            }
        }
        assert_eq!(agent.safes().len(), 9);
        assert_eq!(agent.moves_made().len(), 9);
        assert!(agent.knowledge().is_empty());
    }

    #[test]
    fn test_random_move_exclusion() {
        // Random fallback may never suggest an explored cell or a known
        // mine, and signals exhaustion with None.
        let mut agent = Agent::new(2, 2);
        let mut rng = rand::rng();

        agent.add_knowledge(cell(0, 0), 0).unwrap();
        // The zero observation resolved the whole 2x2 board as safe.
        for _ in 0..50 {
            let pick = agent.random_move(&mut rng).unwrap();
            assert!(!agent.moves_made().contains(&pick));
            assert!(!agent.mines().contains(&pick));
        }

        let mut cornered = Agent::new(2, 2);
        cornered.add_knowledge(cell(0, 0), 3).unwrap();
        // Every other cell is now a known mine.
        assert_eq!(cornered.mines().len(), 3);
        assert_eq!(cornered.random_move(&mut rng), None);
    }

    #[test]
    fn test_safe_move_skips_explored_cells() {
        let mut agent = Agent::new(1, 3);
        agent.add_knowledge(cell(0, 1), 0).unwrap();

        let first = agent.safe_move().unwrap();
        agent.add_knowledge(first, 0).unwrap();

        let second = agent.safe_move().unwrap();
        assert_ne!(first, second);
        assert!(!agent.moves_made().contains(&second));
    }
}
