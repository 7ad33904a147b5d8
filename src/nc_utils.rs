use std::path::Path;

use approx::ulps_eq;
use error_stack::ResultExt;
use ndarray::{Array2, ArrayD, IxDyn};
use netcdf::{
    types::{FloatType, IntType, NcVariableType},
    AttributeValue, Extents, NcTypeDescriptor,
};

use crate::{error::NcError, grid::GridShape};

/// A type that can hold the numeric arrays that might be stored
/// in a netCDF file. It is best created by reading from a netCDF
/// variable with its `get_from` method.
///
/// Keeping the native type lets a variable be copied to another file
/// without any conversion of its values.
#[derive(Debug, Clone, PartialEq)]
pub enum NcArray {
    I8(ArrayD<i8>),
    I16(ArrayD<i16>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
    U64(ArrayD<u64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

impl NcArray {
    /// Retrieve data from a netCDF variable and construct the appropriate variant.
    ///
    /// Compound, opaque, enum, variable length, string and character types
    /// return an [`NcError::UnsupportedType`]; none of them can be a grid field.
    pub fn get_from(var: &netcdf::Variable) -> error_stack::Result<Self, NcError> {
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let arr = match var.vartype() {
            NcVariableType::Int(IntType::I8) => Self::I8(read_typed(var, &shape)?),
            NcVariableType::Int(IntType::I16) => Self::I16(read_typed(var, &shape)?),
            NcVariableType::Int(IntType::I32) => Self::I32(read_typed(var, &shape)?),
            NcVariableType::Int(IntType::I64) => Self::I64(read_typed(var, &shape)?),
            NcVariableType::Int(IntType::U8) => Self::U8(read_typed(var, &shape)?),
            NcVariableType::Int(IntType::U16) => Self::U16(read_typed(var, &shape)?),
            NcVariableType::Int(IntType::U32) => Self::U32(read_typed(var, &shape)?),
            NcVariableType::Int(IntType::U64) => Self::U64(read_typed(var, &shape)?),
            NcVariableType::Float(FloatType::F32) => Self::F32(read_typed(var, &shape)?),
            NcVariableType::Float(FloatType::F64) => Self::F64(read_typed(var, &shape)?),
            _ => return Err(NcError::UnsupportedType(var.name()).into()),
        };
        Ok(arr)
    }

    /// Create a variable in `ds` with the given dimensions and attributes,
    /// then write this data to it. Attributes go in before the data so that
    /// `_FillValue` is accepted by netCDF-4 files.
    pub fn put_to(
        &self,
        ds: &mut netcdf::FileMut,
        name: &str,
        dims: &[&str],
        attrs: &[(String, AttributeValue)],
    ) -> error_stack::Result<(), NcError> {
        match self {
            NcArray::I8(arr) => put_typed(ds, name, dims, attrs, arr),
            NcArray::I16(arr) => put_typed(ds, name, dims, attrs, arr),
            NcArray::I32(arr) => put_typed(ds, name, dims, attrs, arr),
            NcArray::I64(arr) => put_typed(ds, name, dims, attrs, arr),
            NcArray::U8(arr) => put_typed(ds, name, dims, attrs, arr),
            NcArray::U16(arr) => put_typed(ds, name, dims, attrs, arr),
            NcArray::U32(arr) => put_typed(ds, name, dims, attrs, arr),
            NcArray::U64(arr) => put_typed(ds, name, dims, attrs, arr),
            NcArray::F32(arr) => put_typed(ds, name, dims, attrs, arr),
            NcArray::F64(arr) => put_typed(ds, name, dims, attrs, arr),
        }
    }

    /// Convert to double precision, the working type of every grid computation.
    pub fn into_f64(self) -> ArrayD<f64> {
        match self {
            NcArray::I8(arr) => arr.mapv(f64::from),
            NcArray::I16(arr) => arr.mapv(f64::from),
            NcArray::I32(arr) => arr.mapv(f64::from),
            NcArray::I64(arr) => arr.mapv(|v| v as f64),
            NcArray::U8(arr) => arr.mapv(f64::from),
            NcArray::U16(arr) => arr.mapv(f64::from),
            NcArray::U32(arr) => arr.mapv(f64::from),
            NcArray::U64(arr) => arr.mapv(|v| v as f64),
            NcArray::F32(arr) => arr.mapv(f64::from),
            NcArray::F64(arr) => arr,
        }
    }
}

fn read_typed<T: NcTypeDescriptor + Copy>(
    var: &netcdf::Variable,
    shape: &[usize],
) -> error_stack::Result<ArrayD<T>, NcError> {
    let varname = var.name();
    let values = var.get_values::<T, _>(Extents::All).change_context_lazy(|| {
        NcError::context(format!("reading values of variable '{varname}'"))
    })?;
    ArrayD::from_shape_vec(IxDyn(shape), values).change_context_lazy(|| {
        NcError::context(format!("shaping values of variable '{varname}' to its dimensions"))
    })
}

fn put_typed<T: NcTypeDescriptor + Copy>(
    ds: &mut netcdf::FileMut,
    name: &str,
    dims: &[&str],
    attrs: &[(String, AttributeValue)],
    arr: &ArrayD<T>,
) -> error_stack::Result<(), NcError> {
    let mut var = ds
        .add_variable::<T>(name, dims)
        .change_context_lazy(|| NcError::context(format!("creating variable '{name}'")))?;

    for (attname, value) in attrs {
        var.put_attribute(attname, value.clone())
            .change_context_lazy(|| {
                NcError::context(format!(
                    "adding the '{attname}' attribute to variable '{name}'"
                ))
            })?;
    }

    let values = arr.as_standard_layout();
    let slice = values
        .as_slice()
        .ok_or_else(|| NcError::context(format!("laying out values for variable '{name}'")))?;
    var.put_values(slice, Extents::All)
        .change_context_lazy(|| NcError::context(format!("writing values to variable '{name}'")))?;
    Ok(())
}

/// Copy one variable, with its dimensions and attributes, from `src` to `dst`.
///
/// Dimensions already present in `dst` are reused as long as their lengths
/// agree. Unlimited dimensions are recreated with a fixed length equal to
/// their current size in `src`.
pub fn copy_variable(
    src: &netcdf::File,
    src_path: &Path,
    dst: &mut netcdf::FileMut,
    varname: &str,
) -> error_stack::Result<(), NcError> {
    let var = src
        .variable(varname)
        .ok_or_else(|| NcError::missing_variable(src_path, varname))?;

    let mut dim_names = vec![];
    for dim in var.dimensions() {
        let dname = dim.name();
        let existing_len = dst.dimension(&dname).map(|d| d.len());
        match existing_len {
            Some(n) if n == dim.len() => (),
            Some(n) => {
                return Err(NcError::context(format!(
                    "copying '{varname}': dimension '{dname}' has length {n} in the output but {} in {}",
                    dim.len(),
                    src_path.display()
                ))
                .into());
            }
            None => {
                dst.add_dimension(&dname, dim.len()).change_context_lazy(|| {
                    NcError::context(format!("creating dimension '{dname}'"))
                })?;
            }
        }
        dim_names.push(dname);
    }

    let mut attrs = vec![];
    for att in var.attributes() {
        let value = att.value().change_context_lazy(|| {
            NcError::context(format!(
                "reading attribute '{}' of variable '{varname}' in {}",
                att.name(),
                src_path.display()
            ))
        })?;
        attrs.push((att.name().to_string(), value));
    }

    let data = NcArray::get_from(&var).change_context_lazy(|| {
        NcError::context(format!("reading '{varname}' from {}", src_path.display()))
    })?;
    let dim_refs: Vec<&str> = dim_names.iter().map(|s| s.as_str()).collect();
    data.put_to(dst, varname, &dim_refs, &attrs)
}

/// Read a variable as a 2-D grid field of shape `shape`.
///
/// Variables with a leading time dimension contribute their first time
/// slice. Values equal to the variable's `_FillValue` or `missing_value`
/// become NaN.
pub fn read_grid_field(
    ds: &netcdf::File,
    path: &Path,
    varname: &str,
    shape: GridShape,
) -> error_stack::Result<Array2<f64>, NcError> {
    let var = ds
        .variable(varname)
        .ok_or_else(|| NcError::missing_variable(path, varname))?;
    let fills = ["_FillValue", "missing_value"]
        .into_iter()
        .filter_map(|attname| numeric_attribute(&var, attname))
        .collect::<Vec<_>>();

    let values = NcArray::get_from(&var)
        .change_context_lazy(|| {
            NcError::context(format!("reading '{varname}' from {}", path.display()))
        })?
        .into_f64();

    let (cols, rows) = shape.dims();
    let on_grid = match values.shape() {
        [c, r] => (*c, *r) == (cols, rows),
        [nt, c, r] => *nt > 0 && (*c, *r) == (cols, rows),
        _ => false,
    };
    if !on_grid {
        return Err(NcError::ShapeMismatch {
            varname: varname.to_string(),
            expected: (cols, rows),
            actual: values.shape().to_vec(),
        }
        .into());
    }

    // The leading time dimension is outermost, so the first slice comes first
    let flat: Vec<f64> = values
        .iter()
        .take(shape.ncells())
        .map(|&v| {
            if fills.iter().any(|&fill| ulps_eq!(v, fill)) {
                f64::NAN
            } else {
                v
            }
        })
        .collect();
    let field = Array2::from_shape_vec(shape.dims(), flat).change_context_lazy(|| {
        NcError::context(format!("reshaping '{varname}' to the target grid"))
    })?;
    Ok(field)
}

/// Get a scalar numeric attribute as a double, if present.
fn numeric_attribute(var: &netcdf::Variable, attname: &str) -> Option<f64> {
    let value = var.attribute(attname)?.value().ok()?;
    match value {
        AttributeValue::Schar(v) => Some(f64::from(v)),
        AttributeValue::Uchar(v) => Some(f64::from(v)),
        AttributeValue::Short(v) => Some(f64::from(v)),
        AttributeValue::Ushort(v) => Some(f64::from(v)),
        AttributeValue::Int(v) => Some(f64::from(v)),
        AttributeValue::Uint(v) => Some(f64::from(v)),
        AttributeValue::Float(v) => Some(f64::from(v)),
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Floats(v) => v.first().map(|&x| f64::from(x)),
        AttributeValue::Doubles(v) => v.first().copied(),
        _ => None,
    }
}
