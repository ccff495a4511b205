//! Model persistence.
//!
//! A model file records its metadata block, the per-vertex profile table
//! and either an embedded grid or a reference (name plus fingerprint) to a
//! sibling grid file. Referenced grids resolve through a
//! [`GridRegistry`], so models sharing geometry share one resident grid.
//!
//! Loads are all-or-nothing: any fault surfaces before a model is
//! returned, and no partially assembled model ever escapes.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::info;

use crate::error::LoadError;
use crate::grid::{Grid, GridRegistry};
use crate::io::{
    AsciiReader, AsciiWriter, BinaryReader, BinaryWriter, ByteOrder, FileFormat, StreamError,
};
use crate::profile::Profile;

use super::{Metadata, Model};

/// Magic marker opening every model file.
pub const MODEL_MAGIC: &[u8; 12] = b"TERRATESSMDL";

/// Newest format revision this build writes and the oldest it refuses.
pub const MODEL_FORMAT_VERSION: i32 = 1;

/// Grid file name recorded when the grid is embedded in the model file.
const EMBEDDED_GRID: &str = "*";

impl Model {
    /// Load a model file through the process-wide grid registry,
    /// auto-detecting binary versus ascii.
    pub fn load(path: impl AsRef<Path>) -> Result<Model, LoadError> {
        Model::load_with_registry(path, GridRegistry::global())
    }

    /// Load a model file, resolving any referenced grid through the given
    /// registry.
    pub fn load_with_registry(
        path: impl AsRef<Path>,
        registry: &GridRegistry,
    ) -> Result<Model, LoadError> {
        let path = path.as_ref();
        let format = crate::grid::io::detect_format(path)?;
        let file = File::open(path).map_err(StreamError::Io)?;
        let model = match format {
            FileFormat::Binary => {
                let mut reader = BinaryReader::new(BufReader::new(file), ByteOrder::Little);
                read_binary(&mut reader, path, registry)?
            }
            FileFormat::Ascii => {
                let mut reader = AsciiReader::new(BufReader::new(file));
                read_ascii(&mut reader, path, registry)?
            }
        };
        info!(
            path = %path.display(),
            vertices = model.grid().vertex_count(),
            attributes = model.metadata().attribute_count(),
            "loaded model"
        );
        Ok(model)
    }

    /// Save with the grid embedded, in little-endian order for binary.
    pub fn save(&self, path: impl AsRef<Path>, format: FileFormat) -> Result<(), StreamError> {
        self.save_with_order(path, format, ByteOrder::Little)
    }

    /// Save with the grid embedded and an explicit byte order (binary
    /// format only; ascii output is order-free).
    pub fn save_with_order(
        &self,
        path: impl AsRef<Path>,
        format: FileFormat,
        order: ByteOrder,
    ) -> Result<(), StreamError> {
        self.write_file(path.as_ref(), format, order, None)
    }

    /// Save referencing an external grid file instead of embedding the
    /// grid. `grid_file_name` is resolved relative to the model file at
    /// load time; saving the grid itself is the caller's responsibility
    /// (see [`Grid::save`]).
    pub fn save_with_grid_ref(
        &self,
        path: impl AsRef<Path>,
        format: FileFormat,
        grid_file_name: &str,
    ) -> Result<(), StreamError> {
        self.write_file(
            path.as_ref(),
            format,
            ByteOrder::Little,
            Some(grid_file_name),
        )
    }

    fn write_file(
        &self,
        path: &Path,
        format: FileFormat,
        order: ByteOrder,
        grid_ref: Option<&str>,
    ) -> Result<(), StreamError> {
        let file = File::create(path)?;
        match format {
            FileFormat::Binary => {
                let mut writer = BinaryWriter::new(BufWriter::new(file), order);
                write_binary(self, &mut writer, grid_ref)?;
                writer.finish()?;
            }
            FileFormat::Ascii => {
                let mut writer = AsciiWriter::new(BufWriter::new(file));
                write_ascii(self, &mut writer, grid_ref)?;
                writer.finish()?;
            }
        }
        info!(path = %path.display(), ?format, embedded = grid_ref.is_none(), "saved model");
        Ok(())
    }
}

fn write_binary<W: Write>(
    model: &Model,
    writer: &mut BinaryWriter<W>,
    grid_ref: Option<&str>,
) -> Result<(), StreamError> {
    let md = model.metadata();
    writer.write_bytes(MODEL_MAGIC)?;
    writer.write_u8(writer.order().flag())?;
    writer.write_i32(MODEL_FORMAT_VERSION)?;
    writer.write_string(md.software_version())?;
    writer.write_string(md.generation_date())?;
    writer.write_string(md.earth_shape().name())?;
    writer.write_string(md.description())?;
    writer.write_string(&md.names_string())?;
    writer.write_string(&md.units_string())?;

    writer.write_i32(model.grid().vertex_count() as i32)?;
    // The profile table is dominated by doubles; start it word-aligned.
    writer.align(8)?;
    for profile in model.profiles() {
        write_profile_binary(profile, writer)?;
    }

    writer.write_string(model.grid().fingerprint())?;
    writer.write_string(grid_ref.unwrap_or(EMBEDDED_GRID))?;
    if grid_ref.is_none() {
        crate::grid::io::write_binary(model.grid(), writer)?;
    }
    Ok(())
}

fn read_binary<R: Read>(
    reader: &mut BinaryReader<R>,
    path: &Path,
    registry: &GridRegistry,
) -> Result<Model, LoadError> {
    let mut marker = [0u8; 12];
    reader.read_bytes(&mut marker)?;
    if &marker != MODEL_MAGIC {
        return Err(LoadError::BadMagic {
            path: path.to_path_buf(),
            found: String::from_utf8_lossy(&marker).into_owned(),
        });
    }
    let flag = reader.read_u8()?;
    let order = ByteOrder::from_flag(flag).ok_or(LoadError::BadByteOrder { flag })?;
    reader.set_order(order);

    let version = reader.read_i32()?;
    if version < 1 || version > MODEL_FORMAT_VERSION {
        return Err(LoadError::UnsupportedVersion {
            version,
            supported: MODEL_FORMAT_VERSION,
        });
    }

    let software_version = reader.read_string()?;
    let generation_date = reader.read_string()?;
    let shape_name = reader.read_string()?;
    let description = reader.read_string()?;
    let names = reader.read_string()?;
    let units = reader.read_string()?;
    let metadata = assemble_metadata(
        software_version,
        generation_date,
        &shape_name,
        description,
        &names,
        &units,
    )?;

    let nvertices = reader.read_count()?;
    let nattr = metadata.attribute_count();
    reader.align(8)?;
    let mut profiles = Vec::with_capacity(nvertices);
    for vertex in 0..nvertices {
        profiles.push(read_profile_binary(reader, nattr, vertex)?);
    }

    let fingerprint = reader.read_string()?;
    let grid_name = reader.read_string()?;
    let grid = if grid_name == EMBEDDED_GRID {
        let grid = crate::grid::io::read_binary(reader, path)?;
        let computed = grid.fingerprint().to_owned();
        registry.get_or_load(&computed, || Ok(grid))?
    } else {
        resolve_grid(path, &grid_name, &fingerprint, registry)?
    };

    assemble_model(metadata, grid, profiles, &fingerprint)
}

fn write_ascii<W: Write>(
    model: &Model,
    writer: &mut AsciiWriter<W>,
    grid_ref: Option<&str>,
) -> Result<(), StreamError> {
    let md = model.metadata();
    writer.write_line(std::str::from_utf8(MODEL_MAGIC).expect("magic is ascii"))?;
    writer.write_token("little")?;
    writer.write_i32(MODEL_FORMAT_VERSION)?;
    writer.end_line()?;
    writer.write_line(md.software_version())?;
    writer.write_line(md.generation_date())?;
    writer.write_line(md.earth_shape().name())?;
    writer.write_line("<description>")?;
    if !md.description().is_empty() {
        for line in md.description().split('\n') {
            writer.write_line(line)?;
        }
    }
    writer.write_line("</description>")?;
    writer.write_line(&format!("attributes: {}", md.names_string()))?;
    writer.write_line(&format!("units: {}", md.units_string()))?;

    writer.write_i32(model.grid().vertex_count() as i32)?;
    writer.end_line()?;
    for profile in model.profiles() {
        write_profile_ascii(profile, writer)?;
    }

    writer.write_line(model.grid().fingerprint())?;
    writer.write_line(grid_ref.unwrap_or(EMBEDDED_GRID))?;
    if grid_ref.is_none() {
        crate::grid::io::write_ascii(model.grid(), writer)?;
    }
    Ok(())
}

fn read_ascii<R: BufRead>(
    reader: &mut AsciiReader<R>,
    path: &Path,
    registry: &GridRegistry,
) -> Result<Model, LoadError> {
    let marker = reader.read_token()?;
    if marker.as_bytes() != MODEL_MAGIC {
        return Err(LoadError::BadMagic {
            path: path.to_path_buf(),
            found: marker,
        });
    }
    let _order = reader.read_token()?;
    let version = reader.read_i32()?;
    if version < 1 || version > MODEL_FORMAT_VERSION {
        return Err(LoadError::UnsupportedVersion {
            version,
            supported: MODEL_FORMAT_VERSION,
        });
    }

    let software_version = reader.read_line()?;
    let generation_date = reader.read_line()?;
    let shape_name = reader.read_line()?;

    let opener = reader.read_line()?;
    if opener.trim() != "<description>" {
        return Err(LoadError::UnexpectedToken {
            expected: "<description>",
            found: opener,
        });
    }
    let mut description_lines = Vec::new();
    loop {
        let line = reader.read_line()?;
        if line.trim() == "</description>" {
            break;
        }
        description_lines.push(line);
    }

    let names = strip_prefixed_line(reader, "attributes:")?;
    let units = strip_prefixed_line(reader, "units:")?;
    let metadata = assemble_metadata(
        software_version,
        generation_date,
        &shape_name,
        description_lines.join("\n"),
        &names,
        &units,
    )?;

    let nvertices = reader.read_count()?;
    let nattr = metadata.attribute_count();
    let mut profiles = Vec::with_capacity(nvertices);
    for vertex in 0..nvertices {
        profiles.push(read_profile_ascii(reader, nattr, vertex)?);
    }

    let fingerprint = reader.read_token()?;
    let grid_name = reader.read_line()?;
    let grid_name = grid_name.trim();
    let grid = if grid_name == EMBEDDED_GRID {
        let grid = crate::grid::io::read_ascii(reader, path)?;
        let computed = grid.fingerprint().to_owned();
        registry.get_or_load(&computed, || Ok(grid))?
    } else {
        resolve_grid(path, grid_name, &fingerprint, registry)?
    };

    assemble_model(metadata, grid, profiles, &fingerprint)
}

fn strip_prefixed_line<R: BufRead>(
    reader: &mut AsciiReader<R>,
    prefix: &'static str,
) -> Result<String, LoadError> {
    let line = reader.read_line()?;
    match line.trim().strip_prefix(prefix) {
        Some(rest) => Ok(rest.trim().to_owned()),
        None => Err(LoadError::UnexpectedToken {
            expected: prefix,
            found: line,
        }),
    }
}

fn assemble_metadata(
    software_version: String,
    generation_date: String,
    shape_name: &str,
    description: String,
    names: &str,
    units: &str,
) -> Result<Metadata, LoadError> {
    let shape = crate::earth::EarthShape::from_name(shape_name).ok_or_else(|| {
        LoadError::UnknownEarthShape {
            name: shape_name.trim().to_owned(),
        }
    })?;
    let mut metadata = Metadata::from_strings(names, units)?;
    metadata.set_earth_shape(shape);
    metadata.set_description(description);
    metadata.set_software_version(software_version.trim());
    metadata.set_generation_date(generation_date.trim());
    Ok(metadata)
}

/// Locate, load and fingerprint-check an externally referenced grid.
fn resolve_grid(
    model_path: &Path,
    grid_name: &str,
    fingerprint: &str,
    registry: &GridRegistry,
) -> Result<std::sync::Arc<Grid>, LoadError> {
    let grid_path = model_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(grid_name);
    if !grid_path.exists() {
        return Err(LoadError::GridFileMissing { path: grid_path });
    }
    registry.get_or_load(fingerprint, || Grid::load(&grid_path))
}

/// Final cross-checks shared by both readers.
fn assemble_model(
    metadata: Metadata,
    grid: std::sync::Arc<Grid>,
    profiles: Vec<Profile>,
    recorded_fingerprint: &str,
) -> Result<Model, LoadError> {
    if profiles.len() != grid.vertex_count() {
        return Err(LoadError::VertexCountMismatch {
            profiles: profiles.len(),
            vertices: grid.vertex_count(),
        });
    }
    if !recorded_fingerprint.is_empty() && recorded_fingerprint != grid.fingerprint() {
        return Err(LoadError::FingerprintMismatch {
            recorded: recorded_fingerprint.to_owned(),
            computed: grid.fingerprint().to_owned(),
        });
    }
    Ok(Model {
        metadata,
        grid,
        profiles,
    })
}

fn write_profile_binary<W: Write>(
    profile: &Profile,
    writer: &mut BinaryWriter<W>,
) -> Result<(), StreamError> {
    writer.write_u8(profile.tag())?;
    match profile {
        Profile::Empty => Ok(()),
        Profile::Thin { radii, values } => {
            writer.write_f64(radii[0])?;
            writer.write_f64(radii[1])?;
            writer.write_f64_array(values)
        }
        Profile::Constant { values } | Profile::Surface { values } => {
            writer.write_f64_array(values)
        }
        Profile::NPoint { radii, values } => {
            writer.write_i32(radii.len() as i32)?;
            writer.write_f64_array(radii)?;
            writer.write_f64_array(values)
        }
    }
}

fn read_profile_binary<R: Read>(
    reader: &mut BinaryReader<R>,
    nattr: usize,
    vertex: usize,
) -> Result<Profile, LoadError> {
    let tag = reader.read_u8()?;
    match tag {
        0 => Ok(Profile::Empty),
        1 => {
            let r0 = reader.read_f64()?;
            let r1 = reader.read_f64()?;
            let values = reader.read_f64_array(2 * nattr)?;
            Ok(Profile::thin([r0, r1], values, nattr)?)
        }
        2 => Ok(Profile::constant(reader.read_f64_array(nattr)?, nattr)?),
        3 => {
            let nradii = reader.read_count()?;
            let radii = reader.read_f64_array(nradii)?;
            let values = reader.read_f64_array(nradii * nattr)?;
            Ok(Profile::n_point(radii, values, nattr)?)
        }
        4 => Ok(Profile::surface(reader.read_f64_array(nattr)?, nattr)?),
        other => Err(LoadError::UnknownProfileType {
            vertex,
            tag: other.to_string(),
        }),
    }
}

fn write_profile_ascii<W: Write>(
    profile: &Profile,
    writer: &mut AsciiWriter<W>,
) -> Result<(), StreamError> {
    writer.write_token(profile.type_name())?;
    match profile {
        Profile::Empty => {}
        Profile::Thin { radii, values } => {
            writer.write_f64(radii[0])?;
            writer.write_f64(radii[1])?;
            writer.write_f64_array(values)?;
        }
        Profile::Constant { values } | Profile::Surface { values } => {
            writer.write_f64_array(values)?;
        }
        Profile::NPoint { radii, values } => {
            writer.write_i32(radii.len() as i32)?;
            writer.write_f64_array(radii)?;
            writer.write_f64_array(values)?;
        }
    }
    writer.end_line()
}

fn read_profile_ascii<R: BufRead>(
    reader: &mut AsciiReader<R>,
    nattr: usize,
    vertex: usize,
) -> Result<Profile, LoadError> {
    let tag = reader.read_token()?;
    match tag.as_str() {
        "EMPTY" => Ok(Profile::Empty),
        "THIN" => {
            let r0 = reader.read_f64()?;
            let r1 = reader.read_f64()?;
            let values = reader.read_f64_array(2 * nattr)?;
            Ok(Profile::thin([r0, r1], values, nattr)?)
        }
        "CONSTANT" => Ok(Profile::constant(reader.read_f64_array(nattr)?, nattr)?),
        "NPOINT" => {
            let nradii = reader.read_count()?;
            let radii = reader.read_f64_array(nradii)?;
            let values = reader.read_f64_array(nradii * nattr)?;
            Ok(Profile::n_point(radii, values, nattr)?)
        }
        "SURFACE" => Ok(Profile::surface(reader.read_f64_array(nattr)?, nattr)?),
        _ => Err(LoadError::UnknownProfileType { vertex, tag }),
    }
}
