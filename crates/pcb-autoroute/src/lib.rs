pub mod error;
pub mod parsers;
pub mod routing;
pub mod types;

pub use error::{LoadError, SyntaxError};
pub use routing::{route, RoutedNet, RoutingResult, RoutingSettings};
pub use types::Board;

use std::path::Path;

/// Read and parse a `.kicad_pcb` file.
pub fn load(path: &Path) -> Result<Board, LoadError> {
    let data = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parsers::kicad::parse(&data).map_err(|source| LoadError::File {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse board text already in memory.
pub fn load_bytes(data: &[u8]) -> Result<Board, LoadError> {
    Ok(parsers::kicad::parse(data)?)
}
