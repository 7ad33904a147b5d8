//! Target grid geometry and the static auxiliary fields that are loaded
//! once per run.
use std::path::Path;

use error_stack::ResultExt;
use ndarray::Array2;

use crate::{error::NcError, nc_utils::read_grid_field};

/// Shape of every grid field, `(cols, rows)` in array order.
///
/// `cols` is the leading (latitude-like) dimension, matching the `lat`
/// dimension of the output file; `rows` is the trailing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub cols: usize,
    pub rows: usize,
}

impl GridShape {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self { cols, rows }
    }

    pub fn ncells(&self) -> usize {
        self.cols * self.rows
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    pub fn zeros(&self) -> Array2<f64> {
        Array2::zeros(self.dims())
    }
}

/// Names of the variables holding the static grid fields.
#[derive(Debug, Clone)]
pub struct StaticGridVars<'a> {
    pub lat: &'a str,
    pub lon: &'a str,
    pub area: &'a str,
    pub emiss_factor: &'a str,
}

/// Static rasters needed to turn FRE into an emission rate and to
/// georeference the output.
#[derive(Debug, Clone)]
pub struct StaticGrid {
    pub shape: GridShape,
    /// Cell center latitude (degrees north)
    pub lat: Array2<f64>,
    /// Cell center longitude (degrees east)
    pub lon: Array2<f64>,
    /// Target cell area (m2)
    pub area: Array2<f64>,
    /// Emission factor per cell, already mapped from vegetation class
    pub emiss_factor: Array2<f64>,
}

impl StaticGrid {
    /// Load the target grid geometry from `grid_file` and the emission
    /// factor map from `emiss_factor_file`.
    pub fn load(
        grid_file: &Path,
        emiss_factor_file: &Path,
        vars: &StaticGridVars,
        shape: GridShape,
    ) -> error_stack::Result<Self, NcError> {
        log::info!("Reading target grid from {}", grid_file.display());
        let grid_ds = netcdf::open(grid_file).change_context_lazy(|| {
            NcError::context(format!("opening grid file {}", grid_file.display()))
        })?;
        let lat = read_grid_field(&grid_ds, grid_file, vars.lat, shape)?;
        let lon = read_grid_field(&grid_ds, grid_file, vars.lon, shape)?;
        let area = read_grid_field(&grid_ds, grid_file, vars.area, shape)?;

        log::info!(
            "Reading emission factors from {}",
            emiss_factor_file.display()
        );
        let ef_ds = netcdf::open(emiss_factor_file).change_context_lazy(|| {
            NcError::context(format!(
                "opening emission factor file {}",
                emiss_factor_file.display()
            ))
        })?;
        let emiss_factor = read_grid_field(&ef_ds, emiss_factor_file, vars.emiss_factor, shape)?;

        Ok(Self {
            shape,
            lat,
            lon,
            area,
            emiss_factor,
        })
    }

    /// A grid with every static field set to a constant; handy when the
    /// emission rate should equal the raw FRE sum.
    pub fn uniform(shape: GridShape, area: f64, emiss_factor: f64) -> Self {
        Self {
            shape,
            lat: shape.zeros(),
            lon: shape.zeros(),
            area: Array2::from_elem(shape.dims(), area),
            emiss_factor: Array2::from_elem(shape.dims(), emiss_factor),
        }
    }
}
