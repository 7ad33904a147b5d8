//! Runs every stage for one forecast cycle and writes the emissions file.
use std::path::PathBuf;

use error_stack::ResultExt;
use ndarray::{Array2, Zip};

use crate::{
    aggregate::{self, DailyFire, FrpEbbAccumulator},
    config::Config,
    cycle::Cycle,
    emiss_file::{EmissFile, VarMeta},
    fire_age::{FireAgeField, LastSeen},
    grid::StaticGrid,
    naming,
    raster::RasterSource,
    restart::{self, GapFillOutcome, RestartAvailability},
};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("An error occurred while {0}")]
    Context(String),
}

impl PipelineError {
    fn context<S: ToString>(ctx: S) -> Self {
        Self::Context(ctx.to_string())
    }
}

/// Everything the writer needs, in memory.
#[derive(Debug, Clone)]
pub struct DailyFields {
    pub fire: DailyFire,
    pub fire_age: FireAgeField,
    pub hwp_mean: Array2<f64>,
}

/// What a run did, for logging and tests.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output_file: PathBuf,
    pub cycles: Vec<Cycle>,
    pub restarts: RestartAvailability,
    pub gap_fill: GapFillOutcome,
    pub raster_files: usize,
}

/// Produce `SMOKE_RRFS_data_{current}00.nc` in the raster directory.
///
/// `current` is the reference cycle string; it is only validated where the
/// fire age needs it, so an explicit cycle list with a malformed reference
/// still produces a file (with every fire age 0).
pub fn run(config: &Config, current: &str) -> error_stack::Result<RunSummary, PipelineError> {
    let shape = config.grid_shape();
    let cycles = config
        .cycles_for(current)
        .change_context_lazy(|| PipelineError::context("determining the cycles to process"))?;
    log::info!(
        "Preparing smoke emissions for {current} from {} cycles",
        cycles.len()
    );

    let hourly_dir = &config.paths.hourly_restart_dir;
    let restarts = restart::check_restart_files(hourly_dir, &cycles);
    let gap_fill = restart::copy_missing_restarts(
        &config.paths.restart_archive_dir,
        &restarts.missing,
        hourly_dir,
        &config.allow_list(),
    )
    .change_context_lazy(|| PipelineError::context("filling missing restart files"))?;
    if !gap_fill.unavailable.is_empty() {
        log::warn!(
            "{} of {} missing restart files could not be filled",
            gap_fill.unavailable.len(),
            restarts.missing.len()
        );
    }

    let source = config.raster_source();
    let hwp_mean =
        aggregate::hwp_daily_mean(&cycles, hourly_dir, &source, &config.variables.hwp, shape)
            .change_context_lazy(|| PipelineError::context("computing the daily mean HWP"))?;

    let grid = StaticGrid::load(
        &config.paths.grid_file,
        &config.paths.emission_factor_file,
        &config.static_grid_vars(),
        shape,
    )
    .change_context_lazy(|| PipelineError::context("loading the static grid"))?;

    let (fire, fire_age) = scan_rasters(&cycles, &source, &grid, config, current)?;
    let raster_files = fire.nfiles;

    let fields = DailyFields {
        fire,
        fire_age,
        hwp_mean,
    };
    let output_file = source.dir.join(naming::emiss_file_name(current));
    write_emissions(&output_file, &grid, &fields)?;

    Ok(RunSummary {
        output_file,
        cycles,
        restarts,
        gap_fill,
        raster_files,
    })
}

/// One pass over the raster files feeding both the FRP/EBB and the
/// last-detection folds.
fn scan_rasters(
    cycles: &[Cycle],
    source: &RasterSource,
    grid: &StaticGrid,
    config: &Config,
    current: &str,
) -> error_stack::Result<(DailyFire, FireAgeField), PipelineError> {
    let shape = grid.shape;
    let init = (FrpEbbAccumulator::new(shape), LastSeen::new(shape));
    let ((fire_acc, last_seen), nfiles) = source
        .fold_rasters(cycles, shape, init, |(fire_acc, last_seen), raster| {
            (
                fire_acc.add(raster, grid, &config.emissions),
                last_seen.add_raster(raster),
            )
        })
        .change_context_lazy(|| PipelineError::context("scanning the raster files"))?;
    log::info!("{nfiles} of {} cycles had a raster file", cycles.len());

    let fire = fire_acc.finish(shape);
    let fire_age = FireAgeField::from_last_seen(&last_seen, current, shape);
    Ok((fire, fire_age))
}

/// HWP is only reported where a fire burned during the day.
pub fn hwp_where_burning(hwp_mean: &Array2<f64>, frp_mean: &Array2<f64>) -> Array2<f64> {
    Zip::from(hwp_mean)
        .and(frp_mean)
        .map_collect(|&hwp, &frp| if frp > 0.0 { hwp } else { 0.0 })
}

/// Write the coordinates and the four daily fields.
pub fn write_emissions(
    path: &std::path::Path,
    grid: &StaticGrid,
    fields: &DailyFields,
) -> error_stack::Result<(), PipelineError> {
    let err = || PipelineError::context(format!("writing emissions file {}", path.display()));
    let mut out = EmissFile::create(path, grid.shape).change_context_lazy(err)?;

    out.store_latlon(
        "geolat",
        grid.lat.view(),
        &VarMeta {
            long_name: "cell center latitude",
            units: "degrees_north",
            fill_value: -9999.0,
            scale_factor: 1.0,
        },
    )
    .change_context_lazy(err)?;
    out.store_latlon(
        "geolon",
        grid.lon.view(),
        &VarMeta {
            long_name: "cell center longitude",
            units: "degrees_east",
            fill_value: -9999.0,
            scale_factor: 1.0,
        },
    )
    .change_context_lazy(err)?;

    let hwp = hwp_where_burning(&fields.hwp_mean, &fields.fire.frp_mean);
    let fire_end_hr = fields.fire_age.end_hours();
    let data_vars: [(&str, &Array2<f64>, VarMeta); 4] = [
        (
            "frp_davg",
            &fields.fire.frp_mean,
            data_meta("Daily mean Fire Radiative Power", "MW"),
        ),
        (
            "ebb_rate",
            &fields.fire.ebb_rate,
            data_meta("Total EBB emission", "ug m-2 s-1"),
        ),
        (
            "fire_end_hr",
            &fire_end_hr,
            data_meta("Hours since fire was last detected", "hrs"),
        ),
        (
            "hwp_davg",
            &hwp,
            data_meta("Daily mean Hourly Wildfire Potential", "none"),
        ),
    ];
    for (varname, data, meta) in data_vars {
        log::debug!("Writing {varname}");
        out.store_by_level(varname, data.view(), &meta)
            .change_context_lazy(err)?;
    }

    log::info!("Emissions written to {}", out.path().display());
    Ok(())
}

fn data_meta<'a>(long_name: &'a str, units: &'a str) -> VarMeta<'a> {
    VarMeta {
        long_name,
        units,
        fill_value: 0.0,
        scale_factor: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use netcdf::Extents;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        aggregate::{EmissionConstants, SECONDS_PER_DAY},
        config::{GridConfig, PathsConfig, RasterConfig, VariablesConfig},
        test_utils::{cycles, write_field_file, write_raster_file, write_restart_file, TestField},
    };

    const PREFIX: &str = "intp_";

    struct Dirs {
        hourly: TempDir,
        archive: TempDir,
        intp: TempDir,
        statics: TempDir,
    }

    fn setup(window: &[&str]) -> (Dirs, Config) {
        let dirs = Dirs {
            hourly: tempfile::tempdir().unwrap(),
            archive: tempfile::tempdir().unwrap(),
            intp: tempfile::tempdir().unwrap(),
            statics: tempfile::tempdir().unwrap(),
        };

        let grid_file = dirs.statics.path().join("grid_in.nc");
        write_field_file(
            &grid_file,
            &[
                TestField::plain("grid_latt", &[40.0, 40.0, 41.0, 41.0]),
                TestField::plain("grid_lont", &[-100.0, -99.0, -100.0, -99.0]),
                TestField::plain("area", &[1.0; 4]),
            ],
            (2, 2),
        );
        let ef_file = dirs.statics.path().join("veg_map.nc");
        write_field_file(&ef_file, &[TestField::plain("emiss_factor", &[1.0; 4])], (2, 2));

        let config = Config {
            current_cycle: None,
            window_hours: 24,
            cycles: Some(cycles(window)),
            paths: PathsConfig {
                hourly_restart_dir: dirs.hourly.path().to_path_buf(),
                restart_archive_dir: dirs.archive.path().to_path_buf(),
                intp_dir: dirs.intp.path().to_path_buf(),
                emission_factor_file: ef_file,
                grid_file,
            },
            raster: RasterConfig {
                prefix: PREFIX.to_string(),
            },
            grid: GridConfig { cols: 2, rows: 2 },
            emissions: EmissionConstants {
                beta: 1.0,
                unit_scale: 1.0,
            },
            variables: VariablesConfig::default(),
        };
        (dirs, config)
    }

    fn read_output(path: &std::path::Path, varname: &str) -> Vec<f32> {
        let ds = netcdf::open(path).unwrap();
        let var = ds.variable(varname).unwrap();
        var.get_values::<f32, _>(Extents::All).unwrap()
    }

    #[test]
    fn test_end_to_end() {
        let window = ["2024060100", "2024060101", "2024060102"];
        let (dirs, config) = setup(&window);
        let cs = cycles(&window);

        // Rasters at the first and last hour only
        let frp0 = [1.0, 0.0, 0.0, 0.0];
        let frp2 = [2.0, 0.0, 0.0, 0.0];
        write_raster_file(dirs.intp.path(), PREFIX, &cs[0], &frp0, &frp0, (2, 2));
        write_raster_file(dirs.intp.path(), PREFIX, &cs[2], &frp2, &frp2, (2, 2));

        // Restart for the first hour is present upstream; the last one comes
        // from the archive of the forecast started an hour earlier
        write_restart_file(
            &dirs.hourly.path().join(naming::restart_file_name(&cs[0])),
            &[4.0, 4.0, 4.0, 4.0],
            (2, 2),
        );
        let archive_dir = naming::archive_restart_dir(dirs.archive.path(), &cs[1]);
        std::fs::create_dir_all(&archive_dir).unwrap();
        write_restart_file(
            &archive_dir.join("20240601.020000.phy_data.nc"),
            &[2.0, 2.0, 2.0, 2.0],
            (2, 2),
        );

        let summary = run(&config, "2024060103").unwrap();
        assert_eq!(summary.cycles, cs);
        assert_eq!(summary.restarts.available, vec![cs[0]]);
        assert_eq!(summary.gap_fill.filled, vec![cs[2]]);
        assert_eq!(summary.gap_fill.unavailable_cycles(), vec![cs[1]]);
        assert_eq!(summary.raster_files, 2);
        assert_eq!(
            summary.output_file,
            dirs.intp.path().join("SMOKE_RRFS_data_202406010300.nc")
        );

        let out = &summary.output_file;
        let frp = read_output(out, "frp_davg");
        assert_abs_diff_eq!(frp[0], 1.5);
        assert_eq!(&frp[1..], &[0.0, 0.0, 0.0]);

        let ebb = read_output(out, "ebb_rate");
        assert_abs_diff_eq!(f64::from(ebb[0]), 3.0 / SECONDS_PER_DAY, epsilon = 1e-10);
        assert_eq!(&ebb[1..], &[0.0, 0.0, 0.0]);

        // Last detection at 02, reference 03
        let age = read_output(out, "fire_end_hr");
        assert_eq!(age, vec![1.0, 0.0, 0.0, 0.0]);

        // HWP mean of 4 and 2, kept only where FRP burned
        let hwp = read_output(out, "hwp_davg");
        assert_abs_diff_eq!(hwp[0], 3.0);
        assert_eq!(&hwp[1..], &[0.0, 0.0, 0.0]);

        let lat = read_output(out, "geolat");
        assert_eq!(lat, vec![40.0, 40.0, 41.0, 41.0]);
    }

    #[test]
    fn test_no_inputs_gives_zero_fields() {
        let window = ["2024060100", "2024060101"];
        let (dirs, config) = setup(&window);

        let summary = run(&config, "2024060102").unwrap();
        assert_eq!(summary.raster_files, 0);
        assert_eq!(summary.gap_fill.unavailable.len(), 2);
        for varname in ["frp_davg", "ebb_rate", "fire_end_hr", "hwp_davg"] {
            assert_eq!(read_output(&summary.output_file, varname), vec![0.0; 4], "{varname}");
        }
        drop(dirs);
    }

    #[test]
    fn test_malformed_reference_with_explicit_cycles() {
        let window = ["2024060100"];
        let (dirs, config) = setup(&window);
        let cs = cycles(&window);
        let frp = [5.0, 0.0, 0.0, 0.0];
        write_raster_file(dirs.intp.path(), PREFIX, &cs[0], &frp, &[1.0; 4], (2, 2));

        let summary = run(&config, "2024-06-01").unwrap();
        assert_eq!(read_output(&summary.output_file, "fire_end_hr"), vec![0.0; 4]);
        assert_abs_diff_eq!(read_output(&summary.output_file, "frp_davg")[0], 5.0);
    }

    #[test]
    fn test_hwp_where_burning() {
        let hwp = array![[1.0, 2.0], [3.0, f64::NAN]];
        let frp = array![[0.5, 0.0], [-1.0, 0.0]];
        assert_eq!(hwp_where_burning(&hwp, &frp), array![[1.0, 0.0], [0.0, 0.0]]);
    }
}
