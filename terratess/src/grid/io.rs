//! Grid persistence.
//!
//! A grid file carries a 12-byte magic marker, a byte-order flag, a format
//! version, provenance strings, the level table, the vertex table and the
//! triangle table. The same sections are written inline when a model file
//! embeds its grid. Descendant links are never persisted; they are derived
//! again by [`Grid::initialize`] on load.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::info;

use crate::error::LoadError;
use crate::io::{
    AsciiReader, AsciiWriter, BinaryReader, BinaryWriter, ByteOrder, FileFormat, StreamError,
};

use super::{Grid, Level, Triangle, NO_TRIANGLE};

/// Magic marker opening every grid file.
pub const GRID_MAGIC: &[u8; 12] = b"TERRATESSGRD";

/// Newest format revision this build writes and the oldest it refuses.
pub const GRID_FORMAT_VERSION: i32 = 1;

impl Grid {
    /// Load a grid file, auto-detecting binary versus ascii.
    pub fn load(path: impl AsRef<Path>) -> Result<Grid, LoadError> {
        let path = path.as_ref();
        let format = detect_format(path)?;
        let file = File::open(path).map_err(StreamError::Io)?;
        let grid = match format {
            FileFormat::Binary => {
                let mut reader = BinaryReader::new(BufReader::new(file), ByteOrder::Little);
                read_binary(&mut reader, path)?
            }
            FileFormat::Ascii => {
                let mut reader = AsciiReader::new(BufReader::new(file));
                read_ascii(&mut reader, path)?
            }
        };
        info!(
            path = %path.display(),
            vertices = grid.vertex_count(),
            triangles = grid.triangle_count(),
            levels = grid.level_count(),
            "loaded grid"
        );
        Ok(grid)
    }

    /// Save this grid in little-endian byte order (for the binary format).
    pub fn save(&self, path: impl AsRef<Path>, format: FileFormat) -> Result<(), StreamError> {
        self.save_with_order(path, format, ByteOrder::Little)
    }

    /// Save with an explicit byte order. The order only affects the binary
    /// format; ascii output is order-free.
    pub fn save_with_order(
        &self,
        path: impl AsRef<Path>,
        format: FileFormat,
        order: ByteOrder,
    ) -> Result<(), StreamError> {
        let path = path.as_ref();
        let file = File::create(path)?;
        match format {
            FileFormat::Binary => {
                let mut writer = BinaryWriter::new(BufWriter::new(file), order);
                write_binary(self, &mut writer)?;
                writer.finish()?;
            }
            FileFormat::Ascii => {
                let mut writer = AsciiWriter::new(BufWriter::new(file));
                write_ascii(self, &mut writer)?;
                writer.finish()?;
            }
        }
        info!(path = %path.display(), ?format, "saved grid");
        Ok(())
    }

    /// Lightweight format sniff: does this file start with the grid magic?
    ///
    /// Reads only the marker, never the body; used to tell a standalone
    /// grid file from a model file with an embedded grid.
    pub fn sniff(path: impl AsRef<Path>) -> Result<bool, StreamError> {
        let mut file = File::open(path.as_ref())?;
        let mut marker = [0u8; 12];
        match file.read_exact(&mut marker) {
            Ok(()) => Ok(&marker == GRID_MAGIC),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(StreamError::Io(e)),
        }
    }
}

/// Decide binary versus ascii from the byte following the magic: the
/// binary byte-order flag is 0 or 1, never whitespace.
pub(crate) fn detect_format(path: &Path) -> Result<FileFormat, StreamError> {
    let mut file = File::open(path)?;
    let mut head = [0u8; 13];
    match file.read_exact(&mut head) {
        Ok(()) => Ok(if head[12] <= 1 {
            FileFormat::Binary
        } else {
            FileFormat::Ascii
        }),
        // Too short for a binary header; let the ascii reader report it.
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(FileFormat::Ascii),
        Err(e) => Err(StreamError::Io(e)),
    }
}

pub(crate) fn write_binary<W: Write>(
    grid: &Grid,
    writer: &mut BinaryWriter<W>,
) -> Result<(), StreamError> {
    writer.write_bytes(GRID_MAGIC)?;
    writer.write_u8(writer.order().flag())?;
    writer.write_i32(GRID_FORMAT_VERSION)?;
    writer.write_string(grid.software_version())?;
    writer.write_string(grid.generation_date())?;
    writer.write_string(grid.fingerprint())?;

    writer.write_i32(grid.level_count() as i32)?;
    writer.write_i32(grid.vertex_count() as i32)?;
    writer.write_i32(grid.triangle_count() as i32)?;
    for level in grid.levels() {
        writer.write_i32(level.first as i32)?;
        writer.write_i32(level.count as i32)?;
    }
    // The vertex table is a block of doubles; start it word-aligned.
    writer.align(8)?;
    for v in grid.vertices() {
        writer.write_f64_array(v)?;
    }
    for t in grid.triangles() {
        for &vid in &t.vertices {
            writer.write_i32(vid as i32)?;
        }
        writer.write_i32(t.level as i32)?;
        writer.write_i32_array(&t.neighbors)?;
    }
    Ok(())
}

pub(crate) fn read_binary<R: Read>(
    reader: &mut BinaryReader<R>,
    path: &Path,
) -> Result<Grid, LoadError> {
    let mut marker = [0u8; 12];
    reader.read_bytes(&mut marker)?;
    if &marker != GRID_MAGIC {
        return Err(LoadError::BadMagic {
            path: path.to_path_buf(),
            found: String::from_utf8_lossy(&marker).into_owned(),
        });
    }
    let flag = reader.read_u8()?;
    let order = ByteOrder::from_flag(flag).ok_or(LoadError::BadByteOrder { flag })?;
    reader.set_order(order);

    let version = reader.read_i32()?;
    if version < 1 || version > GRID_FORMAT_VERSION {
        return Err(LoadError::UnsupportedVersion {
            version,
            supported: GRID_FORMAT_VERSION,
        });
    }

    let software_version = reader.read_string()?;
    let generation_date = reader.read_string()?;
    let recorded_fingerprint = reader.read_string()?;

    let nlevels = reader.read_count()?;
    let nvertices = reader.read_count()?;
    let ntriangles = reader.read_count()?;

    let mut levels = Vec::with_capacity(nlevels);
    for _ in 0..nlevels {
        let first = reader.read_count()? as u32;
        let count = reader.read_count()? as u32;
        levels.push(Level::new(first, count));
    }

    reader.align(8)?;
    let mut vertices = Vec::with_capacity(nvertices);
    for _ in 0..nvertices {
        let xyz = reader.read_f64_array(3)?;
        vertices.push([xyz[0], xyz[1], xyz[2]]);
    }

    let mut triangles = Vec::with_capacity(ntriangles);
    for _ in 0..ntriangles {
        let v0 = reader.read_count()? as u32;
        let v1 = reader.read_count()? as u32;
        let v2 = reader.read_count()? as u32;
        let level = reader.read_count()? as u32;
        let neighbors = reader.read_i32_array(3)?;
        let mut t = Triangle::new([v0, v1, v2], level, [NO_TRIANGLE; 3]);
        t.neighbors.copy_from_slice(&neighbors);
        triangles.push(t);
    }

    finish_grid(
        vertices,
        triangles,
        levels,
        software_version,
        generation_date,
        recorded_fingerprint,
    )
}

pub(crate) fn write_ascii<W: Write>(
    grid: &Grid,
    writer: &mut AsciiWriter<W>,
) -> Result<(), StreamError> {
    writer.write_line(std::str::from_utf8(GRID_MAGIC).expect("magic is ascii"))?;
    writer.write_token("little")?;
    writer.write_i32(GRID_FORMAT_VERSION)?;
    writer.end_line()?;
    writer.write_line(grid.software_version())?;
    writer.write_line(grid.generation_date())?;
    writer.write_line(grid.fingerprint())?;

    writer.write_i32(grid.level_count() as i32)?;
    writer.write_i32(grid.vertex_count() as i32)?;
    writer.write_i32(grid.triangle_count() as i32)?;
    writer.end_line()?;
    for level in grid.levels() {
        writer.write_i32(level.first as i32)?;
        writer.write_i32(level.count as i32)?;
        writer.end_line()?;
    }
    for v in grid.vertices() {
        writer.write_f64_array(v)?;
        writer.end_line()?;
    }
    for t in grid.triangles() {
        for &vid in &t.vertices {
            writer.write_i32(vid as i32)?;
        }
        writer.write_i32(t.level as i32)?;
        for &n in &t.neighbors {
            writer.write_i32(n)?;
        }
        writer.end_line()?;
    }
    Ok(())
}

pub(crate) fn read_ascii<R: BufRead>(
    reader: &mut AsciiReader<R>,
    path: &Path,
) -> Result<Grid, LoadError> {
    let marker = reader.read_token()?;
    if marker.as_bytes() != GRID_MAGIC {
        return Err(LoadError::BadMagic {
            path: path.to_path_buf(),
            found: marker,
        });
    }
    let _order = reader.read_token()?;
    let version = reader.read_i32()?;
    if version < 1 || version > GRID_FORMAT_VERSION {
        return Err(LoadError::UnsupportedVersion {
            version,
            supported: GRID_FORMAT_VERSION,
        });
    }

    let software_version = reader.read_line()?;
    let generation_date = reader.read_line()?;
    let recorded_fingerprint = reader.read_token()?;

    let nlevels = reader.read_count()?;
    let nvertices = reader.read_count()?;
    let ntriangles = reader.read_count()?;

    let mut levels = Vec::with_capacity(nlevels);
    for _ in 0..nlevels {
        let first = reader.read_count()? as u32;
        let count = reader.read_count()? as u32;
        levels.push(Level::new(first, count));
    }

    let mut vertices = Vec::with_capacity(nvertices);
    for _ in 0..nvertices {
        let xyz = reader.read_f64_array(3)?;
        vertices.push([xyz[0], xyz[1], xyz[2]]);
    }

    let mut triangles = Vec::with_capacity(ntriangles);
    for _ in 0..ntriangles {
        let v0 = reader.read_count()? as u32;
        let v1 = reader.read_count()? as u32;
        let v2 = reader.read_count()? as u32;
        let level = reader.read_count()? as u32;
        let mut neighbors = [NO_TRIANGLE; 3];
        for n in &mut neighbors {
            *n = reader.read_i32()?;
        }
        triangles.push(Triangle::new([v0, v1, v2], level, neighbors));
    }

    finish_grid(
        vertices,
        triangles,
        levels,
        software_version,
        generation_date,
        recorded_fingerprint,
    )
}

/// Assemble, validate and fingerprint-check a freshly parsed grid.
fn finish_grid(
    vertices: Vec<[f64; 3]>,
    triangles: Vec<Triangle>,
    levels: Vec<Level>,
    software_version: String,
    generation_date: String,
    recorded_fingerprint: String,
) -> Result<Grid, LoadError> {
    let mut grid = Grid::new(vertices, triangles, levels);
    grid.set_provenance(software_version, generation_date);
    grid.initialize()?;
    if !recorded_fingerprint.is_empty() && recorded_fingerprint != grid.fingerprint() {
        return Err(LoadError::FingerprintMismatch {
            recorded: recorded_fingerprint,
            computed: grid.fingerprint().to_owned(),
        });
    }
    Ok(grid)
}
