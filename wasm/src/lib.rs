use minesweeper_ai as ai;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub fn create_agent(height: u8, width: u8) -> Vec<u8> {
    console_error_panic_hook::set_once();

    let agent = ai::Agent::new(height as usize, width as usize);
    agent.serialize()
}

#[wasm_bindgen]
pub fn add_knowledge(bts: Vec<u8>, row: usize, col: usize, count: u8) -> Result<Vec<u8>, String> {
    console_error_panic_hook::set_once();

    let mut agent = ai::Agent::deserialize(&bts);
    agent
        .add_knowledge(ai::Cell { row, col }, count)
        .map_err(|e| e.to_string())?;
    Ok(agent.serialize())
}

/// A deduced-safe unexplored cell as `[row, col]`, or empty when none is
/// known.
#[wasm_bindgen]
pub fn safe_move(bts: Vec<u8>) -> Vec<u32> {
    console_error_panic_hook::set_once();

    let agent = ai::Agent::deserialize(&bts);
    match agent.safe_move() {
        Some(cell) => vec![cell.row as u32, cell.col as u32],
        None => Vec::new(),
    }
}

/// A random unexplored, not-known-mine cell as `[row, col]`, or empty when
/// the board is exhausted.
#[wasm_bindgen]
pub fn random_move(bts: Vec<u8>) -> Vec<u32> {
    console_error_panic_hook::set_once();

    let agent = ai::Agent::deserialize(&bts);
    match agent.random_move(&mut rand::rng()) {
        Some(cell) => vec![cell.row as u32, cell.col as u32],
        None => Vec::new(),
    }
}

/// Every cell deduced to be a mine, flattened as `[row, col, row, col, ..]`.
#[wasm_bindgen]
pub fn known_mines(bts: Vec<u8>) -> Vec<u32> {
    console_error_panic_hook::set_once();

    let agent = ai::Agent::deserialize(&bts);
    agent
        .mines()
        .iter()
        .flat_map(|cell| [cell.row as u32, cell.col as u32])
        .collect()
}
