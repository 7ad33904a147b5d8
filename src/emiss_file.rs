//! Writer for the gridded smoke emissions file read by the forecast model.
use std::path::{Path, PathBuf};

use error_stack::ResultExt;
use ndarray::ArrayView2;
use netcdf::Extents;

use crate::grid::GridShape;

static T_DIM_NAME: &str = "t";
static LAT_DIM_NAME: &str = "lat";
static LON_DIM_NAME: &str = "lon";

#[derive(Debug, thiserror::Error)]
pub enum EmissFileError {
    #[error("Field for '{varname}' has shape {actual:?}, the file grid is {expected:?}")]
    ShapeMismatch {
        varname: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("Variable '{0}' has not been defined in the emissions file")]
    UndefinedVariable(String),
    #[error("An error occurred while {0}")]
    Context(String),
}

impl EmissFileError {
    fn context<S: ToString>(ctx: S) -> Self {
        Self::Context(ctx.to_string())
    }
}

/// Metadata attached to every variable in the emissions file.
#[derive(Debug, Clone, Copy)]
pub struct VarMeta<'a> {
    pub long_name: &'a str,
    pub units: &'a str,
    pub fill_value: f32,
    pub scale_factor: f32,
}

/// An emissions file being written. Dimensions are `t` (length 1),
/// `lat` (grid cols) and `lon` (grid rows); all variables are single
/// precision.
pub struct EmissFile {
    ds: netcdf::FileMut,
    path: PathBuf,
    shape: GridShape,
}

impl EmissFile {
    /// Create the file (overwriting any existing one) with the grid dimensions
    /// and global attributes.
    pub fn create(path: &Path, shape: GridShape) -> error_stack::Result<Self, EmissFileError> {
        log::info!("Creating emissions file {}", path.display());
        let mut ds = netcdf::create(path).change_context_lazy(|| {
            EmissFileError::context(format!("creating {}", path.display()))
        })?;

        for (dim, len) in [
            (T_DIM_NAME, 1),
            (LAT_DIM_NAME, shape.cols),
            (LON_DIM_NAME, shape.rows),
        ] {
            ds.add_dimension(dim, len).change_context_lazy(|| {
                EmissFileError::context(format!("creating the '{dim}' dimension"))
            })?;
        }

        for (att, value) in [("PRODUCT_ALGORITHM_VERSION", "Beta"), ("TIME_RANGE", "1 hour")] {
            ds.add_attribute(att, value).change_context_lazy(|| {
                EmissFileError::context(format!("adding the global '{att}' attribute"))
            })?;
        }

        Ok(Self {
            ds,
            path: path.to_path_buf(),
            shape,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Define a 2-D coordinate variable on (`lat`, `lon`) and write `data` to it.
    pub fn store_latlon(
        &mut self,
        varname: &str,
        data: ArrayView2<f64>,
        meta: &VarMeta,
    ) -> error_stack::Result<(), EmissFileError> {
        self.check_shape(varname, &data)?;
        self.define(varname, &[LAT_DIM_NAME, LON_DIM_NAME], meta, "geolat geolon")?;
        self.put(varname, data)
    }

    /// Define a 3-D data variable on (`t`, `lat`, `lon`) without writing data.
    pub fn define_by_level(
        &mut self,
        varname: &str,
        meta: &VarMeta,
    ) -> error_stack::Result<(), EmissFileError> {
        self.define(
            varname,
            &[T_DIM_NAME, LAT_DIM_NAME, LON_DIM_NAME],
            meta,
            "t geolat geolon",
        )
    }

    /// Write `data` into the single time slice of a variable created by
    /// [`EmissFile::define_by_level`].
    pub fn put_time_slice(
        &mut self,
        varname: &str,
        data: ArrayView2<f64>,
    ) -> error_stack::Result<(), EmissFileError> {
        self.check_shape(varname, &data)?;
        self.put(varname, data)
    }

    /// Define a 3-D data variable and write its time slice in one step.
    pub fn store_by_level(
        &mut self,
        varname: &str,
        data: ArrayView2<f64>,
        meta: &VarMeta,
    ) -> error_stack::Result<(), EmissFileError> {
        self.check_shape(varname, &data)?;
        self.define_by_level(varname, meta)?;
        self.put(varname, data)
    }

    fn check_shape(
        &self,
        varname: &str,
        data: &ArrayView2<f64>,
    ) -> error_stack::Result<(), EmissFileError> {
        if data.dim() != self.shape.dims() {
            return Err(EmissFileError::ShapeMismatch {
                varname: varname.to_string(),
                expected: self.shape.dims(),
                actual: data.dim(),
            }
            .into());
        }
        Ok(())
    }

    fn define(
        &mut self,
        varname: &str,
        dims: &[&str],
        meta: &VarMeta,
        coordinates: &str,
    ) -> error_stack::Result<(), EmissFileError> {
        let mut var = self
            .ds
            .add_variable::<f32>(varname, dims)
            .change_context_lazy(|| {
                EmissFileError::context(format!("creating the '{varname}' variable"))
            })?;

        // "FillValue" is plain metadata for the model, not the netCDF _FillValue
        let attrs: [(&str, netcdf::AttributeValue); 6] = [
            ("long_name", meta.long_name.into()),
            ("units", meta.units.into()),
            ("standard_name", varname.into()),
            ("FillValue", meta.fill_value.into()),
            ("scale_factor", meta.scale_factor.into()),
            ("coordinates", coordinates.into()),
        ];
        for (att, value) in attrs {
            var.put_attribute(att, value).change_context_lazy(|| {
                EmissFileError::context(format!(
                    "adding the '{att}' attribute to the '{varname}' variable"
                ))
            })?;
        }
        Ok(())
    }

    fn put(
        &mut self,
        varname: &str,
        data: ArrayView2<f64>,
    ) -> error_stack::Result<(), EmissFileError> {
        let mut var = self
            .ds
            .variable_mut(varname)
            .ok_or_else(|| EmissFileError::UndefinedVariable(varname.to_string()))?;
        let values: Vec<f32> = data.iter().map(|&v| v as f32).collect();
        var.put_values(&values, Extents::All).change_context_lazy(|| {
            EmissFileError::context(format!("writing the '{varname}' variable"))
        })?;
        Ok(())
    }
}
