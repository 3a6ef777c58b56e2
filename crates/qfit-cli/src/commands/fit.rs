use crate::cli::Cli;
use crate::config::PartialRunConfig;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use qfit::{
    core::{
        density::map::DensityMap,
        io::{ccp4::Ccp4File, pdb::PdbFile, traits::StructureFile},
        models::{
            ligand::Ligand,
            structure::{SelectionAttribute, SelectionOperator, Structure},
        },
        utils::geometry::calculate_rmsd,
    },
    engine::{error::EngineError, progress::ProgressReporter, selection::SelectionResult},
    workflows::{
        self,
        build::BuildInput,
        multiconformer::{MulticonformerConfig, MulticonformerOutput},
    },
};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

const SUMMARY_FILE: &str = "selection_summary.csv";
const MODEL_DENSITY_FILE: &str = "conformer_model.ccp4";
const ALT_LOCS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// One written conformer in the summary CSV.
#[derive(Debug, Serialize)]
struct SummaryRow {
    base: String,
    cardinality: usize,
    exact: bool,
    file: String,
    occupancy: f64,
    fit_score: f64,
    residual: f64,
}

struct Inputs {
    map: DensityMap,
    ligand: Ligand,
    receptor: Option<Structure>,
}

pub fn run(args: &Cli) -> Result<()> {
    let config = load_config(args)?;
    let inputs = load_inputs(args)?;

    let input = BuildInput {
        ligand: &inputs.ligand,
        map: &inputs.map,
        resolution: args.resolution,
        receptor: inputs.receptor.as_ref(),
    };

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Building and selecting ligand conformers...");
    info!("Invoking the multiconformer workflow...");
    let output = workflows::multiconformer::run(&input, &config, &reporter)?;
    info!(
        pool = output.build.pool.len(),
        sweep = output.sweep.len(),
        "Workflow finished."
    );

    let rows = write_results(&args.directory, &inputs.ligand, &output)?;
    let summary_path = args.directory.join(SUMMARY_FILE);
    write_summary(&summary_path, &rows)?;
    println!("✓ Selection summary written to: {}", summary_path.display());

    if args.write_model_density {
        match &output.initial {
            Ok(initial) => {
                let path = args.directory.join(MODEL_DENSITY_FILE);
                write_model_density(&path, &inputs.map, &output, initial)?;
                println!("✓ Model density written to: {}", path.display());
            }
            Err(e) => warn!(error = %e, "No initial fit; model density not written."),
        }
    }

    Ok(())
}

fn load_config(args: &Cli) -> Result<MulticonformerConfig> {
    let partial = match &args.config {
        Some(path) => PartialRunConfig::from_file(path)?,
        None => PartialRunConfig::default(),
    };
    info!("Merging configuration from file and CLI arguments...");
    let config = partial.merge_with_cli(args)?;
    match toml::to_string(&config) {
        Ok(rendered) => debug!("Final configuration:\n{}", rendered),
        Err(e) => debug!("Final configuration could not be rendered: {}", e),
    }
    Ok(config)
}

fn load_inputs(args: &Cli) -> Result<Inputs> {
    info!("Loading density map from {:?}", &args.xmap);
    let map = Ccp4File::read_from_path(&args.xmap).map_err(|e| CliError::FileParsing {
        path: args.xmap.clone(),
        source: e.into(),
    })?;
    let stats = map.statistics();
    info!(
        extent = ?map.extent(),
        mean = stats.mean,
        rms = stats.rms,
        "Density map loaded."
    );

    info!("Loading ligand from {:?}", &args.ligand);
    let structure = read_structure(&args.ligand)?;
    let ligand = Ligand::from_structure(&structure).map_err(EngineError::from)?;

    let receptor = match &args.receptor {
        Some(path) => {
            info!("Loading receptor from {:?}", path);
            let receptor = read_structure(path)?.select(
                SelectionAttribute::Element,
                "H",
                SelectionOperator::NotEqual,
            );
            info!(atoms = receptor.len(), "Receptor loaded without hydrogens.");
            Some(receptor)
        }
        None => None,
    };

    Ok(Inputs {
        map,
        ligand,
        receptor,
    })
}

fn read_structure(path: &Path) -> Result<Structure> {
    PdbFile::read_from_path(path).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

/// Writes the initial fit as `conformer_<k>.pdb` and each sweep cardinality
/// `n` as `conformer_<n>_<k>.pdb`. Failed solves write nothing.
fn write_results(
    directory: &Path,
    ligand: &Ligand,
    output: &MulticonformerOutput,
) -> Result<Vec<SummaryRow>> {
    let mut rows = Vec::new();
    match &output.initial {
        Ok(initial) => {
            rows.extend(write_selection(directory, "conformer", ligand, output, initial)?);
            println!(
                "✓ Initial fit: {} conformer(s), residual {:.4}",
                initial.len(),
                initial.residual
            );
        }
        Err(e) => {
            warn!(error = %e, "Initial fit failed; no result written.");
            println!("✗ Initial fit: no solution ({})", e);
        }
    }

    for entry in &output.sweep {
        let base = format!("conformer_{}", entry.cardinality);
        match &entry.outcome {
            Ok(result) => {
                rows.extend(write_selection(directory, &base, ligand, output, result)?);
                println!(
                    "  Cardinality {}: {} conformer(s), residual {:.4}",
                    entry.cardinality,
                    result.len(),
                    result.residual
                );
            }
            Err(e) => {
                warn!(cardinality = entry.cardinality, error = %e, "No result written.");
                println!("  Cardinality {}: no solution ({})", entry.cardinality, e);
            }
        }
    }
    Ok(rows)
}

fn write_selection(
    directory: &Path,
    base: &str,
    ligand: &Ligand,
    output: &MulticonformerOutput,
    result: &SelectionResult,
) -> Result<Vec<SummaryRow>> {
    let mut rows = Vec::with_capacity(result.len());
    for (k, selected) in result.conformers.iter().enumerate() {
        let candidate = output.build.pool.get(selected.candidate).ok_or_else(|| {
            CliError::Other(anyhow::anyhow!(
                "Selected conformer {} is not in the pool of {}",
                selected.candidate,
                output.build.pool.len()
            ))
        })?;

        let structure = ligand
            .conformer_structure(
                &candidate.coordinates,
                selected.weight,
                alt_loc(k, result.len()),
            )
            .map_err(EngineError::from)?;
        let file = format!("{}_{}.pdb", base, k + 1);
        let path = directory.join(&file);
        debug!(
            rmsd = calculate_rmsd(&candidate.coordinates, ligand.positions()),
            "Writing {} (occupancy {:.3}, score {:.4})",
            file,
            selected.weight,
            candidate.score
        );
        PdbFile::write_to_path(&structure, &path).map_err(|e| CliError::FileWriting {
            path: path.clone(),
            source: e.into(),
        })?;

        rows.push(SummaryRow {
            base: base.to_string(),
            cardinality: result.cardinality,
            exact: result.exact,
            file,
            occupancy: selected.weight,
            fit_score: candidate.score,
            residual: result.residual,
        });
    }
    Ok(rows)
}

/// Alternate location of the `k`-th of `count` conformers; a lone conformer has none.
fn alt_loc(k: usize, count: usize) -> Option<char> {
    (count > 1).then(|| ALT_LOCS[k % ALT_LOCS.len()] as char)
}

fn write_summary(path: &Path, rows: &[SummaryRow]) -> Result<()> {
    let to_error = |e: csv::Error| CliError::FileWriting {
        path: path.to_path_buf(),
        source: e.into(),
    };
    let mut writer = csv::Writer::from_path(path).map_err(to_error)?;
    for row in rows {
        writer.serialize(row).map_err(to_error)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_model_density(
    path: &Path,
    map: &DensityMap,
    output: &MulticonformerOutput,
    selection: &SelectionResult,
) -> Result<()> {
    let weights = selection.weights(output.build.pool.len());
    let mut model = map.zeros_like();
    model.accumulate(output.problem.region(), &output.problem.model_density(&weights));
    Ccp4File::write_to_path(&model, path).map_err(|e| CliError::FileWriting {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use nalgebra::Point3;
    use ndarray::Array3;
    use qfit::core::density::map::UnitCell;
    use qfit::core::models::atom::Atom;
    use qfit::core::models::element::Element;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const BOX: f64 = 20.0;
    const SAMPLING: usize = 40;

    fn butane() -> Structure {
        let mut structure = Structure::new();
        for i in 0..4 {
            let y = if i % 2 == 0 { 0.0 } else { 0.89 };
            let position = Point3::new(7.0 + 1.26 * i as f64, 9.5 + y, 10.0);
            structure.add_atom(Atom::new(&format!("C{}", i + 1), Element::C, position));
        }
        structure
    }

    fn blob_map(centres: &[Point3<f64>]) -> DensityMap {
        let spacing = BOX / SAMPLING as f64;
        let data = Array3::from_shape_fn((SAMPLING, SAMPLING, SAMPLING), |(x, y, z)| {
            let point = Point3::new(x as f64, y as f64, z as f64) * spacing;
            centres
                .iter()
                .map(|c| (-(point - c).norm_squared() / 0.72).exp())
                .sum::<f64>() as f32
        });
        let cell = UnitCell::new([BOX; 3], [90.0; 3]).unwrap();
        DensityMap::new(cell, [SAMPLING; 3], [0; 3], data).unwrap()
    }

    /// Writes the ligand and its map into a fresh directory.
    fn workspace() -> (TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let structure = butane();
        let ligand_path = dir.path().join("ligand.pdb");
        PdbFile::write_to_path(&structure, &ligand_path).unwrap();
        let map_path = dir.path().join("map.ccp4");
        Ccp4File::write_to_path(&blob_map(&structure.positions()), &map_path).unwrap();
        (dir, map_path, ligand_path)
    }

    fn cli(map: &Path, ligand: &Path, out: &Path, extra: &[&str]) -> Cli {
        let mut args = vec![
            "qfit-ligand".to_string(),
            map.display().to_string(),
            "1.5".to_string(),
            ligand.display().to_string(),
            "-d".to_string(),
            out.display().to_string(),
            "-s".to_string(),
            "30".to_string(),
            "--no-local".to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        Cli::parse_from(args)
    }

    #[test]
    fn writes_conformers_and_summary() {
        let (dir, map, ligand) = workspace();
        let out = dir.path().join("results");
        fs::create_dir_all(&out).unwrap();

        run(&cli(&map, &ligand, &out, &[])).unwrap();

        assert!(out.join("conformer_1.pdb").exists());
        assert!(out.join("conformer_1_1.pdb").exists());
        assert!(!out.join(MODEL_DENSITY_FILE).exists());

        let single = PdbFile::read_from_path(out.join("conformer_1_1.pdb")).unwrap();
        assert_eq!(single.len(), 4);
        assert!(single.atoms_iter().all(|(_, a)| a.occupancy == 1.0 && a.alt_loc.is_none()));

        let mut reader = csv::Reader::from_path(out.join(SUMMARY_FILE)).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["base", "cardinality", "exact", "file", "occupancy", "fit_score", "residual"]
        );
        let records: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert!(records.iter().any(|r| &r[0] == "conformer" && &r[2] == "false"));
        assert!(records.iter().any(|r| &r[0] == "conformer_1" && &r[3] == "conformer_1_1.pdb"));
        let initial_occupancy: f64 = records
            .iter()
            .filter(|r| &r[0] == "conformer")
            .map(|r| r[4].parse::<f64>().unwrap())
            .sum();
        assert!((initial_occupancy - 1.0).abs() < 1e-6);
    }

    #[test]
    fn model_density_is_written_on_request() {
        let (dir, map, ligand) = workspace();
        run(&cli(&map, &ligand, dir.path(), &["--write-model-density"])).unwrap();

        let model = Ccp4File::read_from_path(dir.path().join(MODEL_DENSITY_FILE)).unwrap();
        assert_eq!(model.extent(), [SAMPLING; 3]);
        assert!(model.statistics().max > 0.0);
    }

    #[test]
    fn failed_initial_fit_still_writes_the_sweep() {
        let (dir, map, ligand) = workspace();
        let args = cli(
            &map,
            &ligand,
            dir.path(),
            &["--write-model-density", "-S", "solver.time-limit=1e-12"],
        );
        run(&args).unwrap();

        assert!(!dir.path().join("conformer_1.pdb").exists());
        assert!(!dir.path().join(MODEL_DENSITY_FILE).exists());
        assert!(dir.path().join("conformer_1_1.pdb").exists());

        let mut reader = csv::Reader::from_path(dir.path().join(SUMMARY_FILE)).unwrap();
        let records: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert!(!records.is_empty());
        assert!(records.iter().all(|r| &r[0] != "conformer"));
    }

    #[test]
    fn unreadable_ligand_is_a_parsing_error() {
        let (dir, map, _) = workspace();
        let missing = dir.path().join("missing.pdb");
        let result = run(&cli(&map, &missing, dir.path(), &[]));
        assert!(matches!(result, Err(CliError::FileParsing { .. })));
    }

    #[test]
    fn alt_locs_are_letters_only_for_several_conformers() {
        assert_eq!(alt_loc(0, 1), None);
        assert_eq!(alt_loc(0, 3), Some('A'));
        assert_eq!(alt_loc(2, 3), Some('C'));
    }
}
