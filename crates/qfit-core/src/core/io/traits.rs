use crate::core::models::structure::Structure;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Defines the interface for reading and writing coordinate file formats.
///
/// Implementors handle format-specific parsing and serialization; header
/// records that must survive a round trip are carried on the [`Structure`]
/// itself.
pub trait StructureFile {
    /// The error type for I/O operations.
    type Error: Error + From<io::Error>;

    /// Reads a structure from a buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or I/O operations encounter issues.
    fn read_from(reader: &mut impl BufRead) -> Result<Structure, Self::Error>;

    /// Writes a structure to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_to(structure: &Structure, writer: &mut impl Write) -> Result<(), Self::Error>;

    /// Reads a structure from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsing fails.
    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Structure, Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    /// Writes a structure to a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    fn write_to_path<P: AsRef<Path>>(structure: &Structure, path: P) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(structure, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
