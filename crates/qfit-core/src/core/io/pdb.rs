use crate::core::io::traits::StructureFile;
use crate::core::models::atom::{Atom, RecordKind};
use crate::core::models::element::Element;
use crate::core::models::ids::AtomId;
use crate::core::models::structure::Structure;
use crate::core::models::topology::BondOrder;
use nalgebra::Point3;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, BufRead, Write};
use std::str::FromStr;
use thiserror::Error;

/// Coordinate records are usable once they reach the end of the z column.
const MIN_COORDINATE_LINE_LENGTH: usize = 54;
/// Header records copied to the output files.
const KEPT_HEADER_RECORDS: &[&str] = &["CRYST1", "SCALE1", "SCALE2", "SCALE3"];
/// Partners listed per `CONECT` line.
const CONECT_PARTNERS_PER_LINE: usize = 4;

#[derive(Debug, Error)]
pub enum PdbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: PdbParseErrorKind },
    #[error("Missing required record: {0}")]
    MissingRecord(String),
}

#[derive(Debug, Error)]
pub enum PdbParseErrorKind {
    #[error("Invalid integer format in columns {columns} (value: '{value}')")]
    InvalidInt { columns: String, value: String },
    #[error("Invalid float format in columns {columns} (value: '{value}')")]
    InvalidFloat { columns: String, value: String },
    #[error("Required field in columns {columns} is empty")]
    MissingRequiredField { columns: String },
    #[error("Line is too short for ATOM/HETATM record (must be at least 54 chars)")]
    LineTooShort,
}

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).unwrap_or("").trim()
}

fn parse_float(line: &str, line_num: usize, start: usize, end: usize) -> Result<f64, PdbError> {
    let value = slice_and_trim(line, start, end);
    value.parse().map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidFloat {
            columns: format!("{}-{}", start + 1, end),
            value: value.into(),
        },
    })
}

fn parse_optional_float(
    line: &str,
    line_num: usize,
    start: usize,
    end: usize,
    default: f64,
) -> Result<f64, PdbError> {
    if slice_and_trim(line, start, end).is_empty() {
        Ok(default)
    } else {
        parse_float(line, line_num, start, end)
    }
}

fn optional_char(line: &str, column: usize) -> Option<char> {
    line.get(column..column + 1)
        .and_then(|s| s.chars().next())
        .filter(|c| !c.is_whitespace())
}

/// Reader and writer for the coordinate subset of the PDB format.
///
/// Reads `ATOM`/`HETATM`, `CONECT` and `CRYST1`/`SCALEn` records of the first
/// model. Repeated partners in `CONECT` records are read as bond multiplicity,
/// the convention most small-molecule tools use for double and triple bonds.
pub struct PdbFile;

impl PdbFile {
    fn parse_atom(line: &str, line_num: usize) -> Result<Atom, PdbError> {
        if line.len() < MIN_COORDINATE_LINE_LENGTH {
            return Err(PdbError::Parse {
                line: line_num,
                kind: PdbParseErrorKind::LineTooShort,
            });
        }

        let serial_str = slice_and_trim(line, 6, 11);
        let serial: usize = serial_str.parse().map_err(|_| PdbError::Parse {
            line: line_num,
            kind: PdbParseErrorKind::InvalidInt {
                columns: "7-11".into(),
                value: serial_str.into(),
            },
        })?;

        let name = slice_and_trim(line, 12, 16);
        if name.is_empty() {
            return Err(PdbError::Parse {
                line: line_num,
                kind: PdbParseErrorKind::MissingRequiredField {
                    columns: "13-16".into(),
                },
            });
        }

        let res_seq_str = slice_and_trim(line, 22, 26);
        let residue_number: isize = if res_seq_str.is_empty() {
            0
        } else {
            res_seq_str.parse().map_err(|_| PdbError::Parse {
                line: line_num,
                kind: PdbParseErrorKind::InvalidInt {
                    columns: "23-26".into(),
                    value: res_seq_str.into(),
                },
            })?
        };

        let x = parse_float(line, line_num, 30, 38)?;
        let y = parse_float(line, line_num, 38, 46)?;
        let z = parse_float(line, line_num, 46, 54)?;
        let occupancy = parse_optional_float(line, line_num, 54, 60, 1.0)?;
        let b_factor = parse_optional_float(line, line_num, 60, 66, 0.0)?;

        let element_str = slice_and_trim(line, 76, 78);
        let element = element_str
            .parse::<Element>()
            .unwrap_or_else(|_| Element::from_atom_name(name));

        Ok(Atom {
            serial,
            name: name.to_string(),
            element,
            residue_name: slice_and_trim(line, 17, 20).to_string(),
            chain_id: optional_char(line, 21).unwrap_or(' '),
            residue_number,
            insertion_code: optional_char(line, 26),
            alt_loc: optional_char(line, 16),
            record: RecordKind::from_str(slice_and_trim(line, 0, 6)).unwrap_or_default(),
            position: Point3::new(x, y, z),
            occupancy,
            b_factor,
        })
    }

    fn parse_conect(line: &str) -> Option<(usize, Vec<usize>)> {
        let mut fields = Vec::new();
        let mut start = 6;
        while start < line.len() {
            let field = slice_and_trim(line, start, start + 5);
            if !field.is_empty() {
                fields.push(field.parse::<usize>().ok()?);
            }
            start += 5;
        }
        if fields.len() < 2 {
            return None;
        }
        let origin = fields.remove(0);
        Some((origin, fields))
    }

    fn format_atom_name(atom: &Atom) -> String {
        let name = atom.name.trim();
        if name.len() < 4 && atom.element.symbol().len() == 1 {
            format!(" {:<3}", name)
        } else {
            format!("{:<4}", name)
        }
    }

    /// Serials used on output: the stored ones if they are usable as keys,
    /// otherwise a fresh 1-based numbering in file order.
    fn output_serials(structure: &Structure) -> HashMap<AtomId, usize> {
        let mut seen = HashSet::new();
        let usable = structure
            .atoms_iter()
            .all(|(_, atom)| atom.serial > 0 && seen.insert(atom.serial));
        structure
            .atoms_iter()
            .enumerate()
            .map(|(i, (id, atom))| (id, if usable { atom.serial } else { i + 1 }))
            .collect()
    }
}

impl StructureFile for PdbFile {
    type Error = PdbError;

    fn read_from(reader: &mut impl BufRead) -> Result<Structure, Self::Error> {
        let mut structure = Structure::new();
        let mut serial_to_id: HashMap<usize, AtomId> = HashMap::new();
        let mut conect_counts: BTreeMap<(usize, usize), usize> = BTreeMap::new();

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;
            let record_type = slice_and_trim(&line, 0, 6);

            match record_type {
                "ATOM" | "HETATM" => {
                    let atom = Self::parse_atom(&line, line_num)?;
                    let serial = atom.serial;
                    let id = structure.add_atom(atom);
                    serial_to_id.entry(serial).or_insert(id);
                }
                "CONECT" => {
                    if let Some((origin, partners)) = Self::parse_conect(&line) {
                        for partner in partners {
                            *conect_counts.entry((origin, partner)).or_default() += 1;
                        }
                    }
                }
                record if KEPT_HEADER_RECORDS.contains(&record) => {
                    structure.push_header_line(line.clone());
                }
                "ENDMDL" | "END" => break,
                _ => {}
            }
        }

        if structure.is_empty() {
            return Err(PdbError::MissingRecord("ATOM/HETATM records".into()));
        }

        let mut multiplicity: BTreeMap<(usize, usize), usize> = BTreeMap::new();
        for (&(a, b), &count) in &conect_counts {
            let key = (a.min(b), a.max(b));
            let entry = multiplicity.entry(key).or_default();
            *entry = (*entry).max(count);
        }
        for ((a, b), count) in multiplicity {
            let (Some(&id_a), Some(&id_b)) = (serial_to_id.get(&a), serial_to_id.get(&b)) else {
                continue;
            };
            let order = match count {
                1 => BondOrder::Single,
                2 => BondOrder::Double,
                3 => BondOrder::Triple,
                _ => BondOrder::Unknown,
            };
            structure.add_bond(id_a, id_b, order);
        }

        Ok(structure)
    }

    fn write_to(structure: &Structure, writer: &mut impl Write) -> Result<(), Self::Error> {
        for line in structure.header_lines() {
            writeln!(writer, "{}", line)?;
        }

        let serials = Self::output_serials(structure);
        for (id, atom) in structure.atoms_iter() {
            writeln!(
                writer,
                "{:<6}{:>5} {}{}{:>3} {}{:>4}{}   {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}          {:>2}",
                atom.record.as_str(),
                serials[&id],
                Self::format_atom_name(atom),
                atom.alt_loc.unwrap_or(' '),
                atom.residue_name,
                atom.chain_id,
                atom.residue_number,
                atom.insertion_code.unwrap_or(' '),
                atom.position.x,
                atom.position.y,
                atom.position.z,
                atom.occupancy,
                atom.b_factor,
                atom.element.symbol(),
            )?;
        }

        for (id, _) in structure.atoms_iter() {
            let Some(neighbors) = structure.bonded_neighbors(id) else {
                continue;
            };
            if neighbors.is_empty() {
                continue;
            }
            let mut partners: Vec<usize> = Vec::new();
            for &neighbor in neighbors {
                let order = structure
                    .bonds()
                    .iter()
                    .find(|bond| bond.contains(id) && bond.contains(neighbor))
                    .map(|bond| bond.order)
                    .unwrap_or_default();
                let repeats = match order {
                    BondOrder::Double => 2,
                    BondOrder::Triple => 3,
                    _ => 1,
                };
                partners.extend(std::iter::repeat_n(serials[&neighbor], repeats));
            }
            for chunk in partners.chunks(CONECT_PARTNERS_PER_LINE) {
                write!(writer, "CONECT{:>5}", serials[&id])?;
                for serial in chunk {
                    write!(writer, "{:>5}", serial)?;
                }
                writeln!(writer)?;
            }
        }

        writeln!(writer, "END")?;
        Ok(())
    }
}
