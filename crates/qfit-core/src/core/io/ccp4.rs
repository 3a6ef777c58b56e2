//! CCP4/MRC density map reader and writer.
//!
//! Reads the 1024-byte header followed by the column/row/section grid. Modes 0
//! (i8), 1 (i16), 2 (f32) and 6 (u16) are supported, with endianness taken
//! from MACHST. Maps are always written as little-endian mode 2 in X/Y/Z order.

use crate::core::density::map::{DensityError, DensityMap, UnitCell};
use nalgebra::Vector3;
use ndarray::Array3;
use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

const HEADER_SIZE: usize = 1024;
const MAP_MAGIC: &[u8; 4] = b"MAP ";
const MACHST_LITTLE_ENDIAN: [u8; 4] = [0x44, 0x41, 0x00, 0x00];
const LABEL: &str = "qfit-ligand model density";

pub struct Ccp4File;

struct HeaderReader<'a> {
    header: &'a [u8],
    little_endian: bool,
}

impl HeaderReader<'_> {
    fn word(&self, offset: usize) -> [u8; 4] {
        let b = &self.header[offset..offset + 4];
        [b[0], b[1], b[2], b[3]]
    }

    fn i32_at(&self, offset: usize) -> i32 {
        if self.little_endian {
            i32::from_le_bytes(self.word(offset))
        } else {
            i32::from_be_bytes(self.word(offset))
        }
    }

    fn f32_at(&self, offset: usize) -> f32 {
        if self.little_endian {
            f32::from_le_bytes(self.word(offset))
        } else {
            f32::from_be_bytes(self.word(offset))
        }
    }
}

fn is_supported_mode(mode: i32) -> bool {
    matches!(mode, 0 | 1 | 2 | 6)
}

fn detect_endianness(header: &[u8]) -> Result<bool, DensityError> {
    match header[212] {
        0x44 => Ok(true),
        0x11 => Ok(false),
        machst => {
            let mode_bytes = [header[12], header[13], header[14], header[15]];
            let mode_le = i32::from_le_bytes(mode_bytes);
            let mode_be = i32::from_be_bytes(mode_bytes);
            if is_supported_mode(mode_le) {
                Ok(true)
            } else if is_supported_mode(mode_be) {
                Ok(false)
            } else {
                Err(DensityError::InvalidFormat(format!(
                    "cannot determine endianness: MACHST={machst:#x}, MODE(LE)={mode_le}, MODE(BE)={mode_be}"
                )))
            }
        }
    }
}

fn decode_values(
    data: &[u8],
    mode: i32,
    count: usize,
    little_endian: bool,
) -> Result<Vec<f32>, DensityError> {
    let bytes_per_voxel = match mode {
        0 => 1,
        1 | 6 => 2,
        2 => 4,
        _ => return Err(DensityError::UnsupportedMode(mode)),
    };
    let needed = count * bytes_per_voxel;
    if data.len() < needed {
        return Err(DensityError::InvalidFormat(format!(
            "not enough data: need {needed} bytes for {count} voxels (mode {mode}), got {}",
            data.len()
        )));
    }

    let chunks = data[..needed].chunks_exact(bytes_per_voxel);
    let values = match (mode, little_endian) {
        (0, _) => chunks.map(|b| b[0] as i8 as f32).collect(),
        (1, true) => chunks.map(|b| i16::from_le_bytes([b[0], b[1]]) as f32).collect(),
        (1, false) => chunks.map(|b| i16::from_be_bytes([b[0], b[1]]) as f32).collect(),
        (6, true) => chunks.map(|b| u16::from_le_bytes([b[0], b[1]]) as f32).collect(),
        (6, false) => chunks.map(|b| u16::from_be_bytes([b[0], b[1]]) as f32).collect(),
        (_, true) => chunks
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        (_, false) => chunks
            .map(|b| f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    };
    Ok(values)
}

impl Ccp4File {
    pub fn read_from_bytes(bytes: &[u8]) -> Result<DensityMap, DensityError> {
        if bytes.len() < HEADER_SIZE {
            return Err(DensityError::InvalidFormat(format!(
                "file too small for map header: {} bytes (need at least {HEADER_SIZE})",
                bytes.len()
            )));
        }
        let header = &bytes[..HEADER_SIZE];
        if &header[208..212] != MAP_MAGIC {
            return Err(DensityError::InvalidFormat(format!(
                "missing MAP magic at offset 208: got {:?}",
                &header[208..212]
            )));
        }
        let reader = HeaderReader {
            header,
            little_endian: detect_endianness(header)?,
        };

        let dims = [reader.i32_at(0), reader.i32_at(4), reader.i32_at(8)];
        if dims.iter().any(|&d| d <= 0) {
            return Err(DensityError::InvalidFormat(format!(
                "non-positive grid dimensions: {:?}",
                dims
            )));
        }
        let mode = reader.i32_at(12);
        if !is_supported_mode(mode) {
            return Err(DensityError::UnsupportedMode(mode));
        }
        let file_starts = [reader.i32_at(16), reader.i32_at(20), reader.i32_at(24)];
        let sampling = [reader.i32_at(28), reader.i32_at(32), reader.i32_at(36)];
        if sampling.iter().any(|&m| m <= 0) {
            return Err(DensityError::InvalidFormat(format!(
                "non-positive unit cell sampling: {:?}",
                sampling
            )));
        }
        let lengths = [40, 44, 48].map(|o| reader.f32_at(o) as f64);
        let angles = [52, 56, 60].map(|o| reader.f32_at(o) as f64);

        let axis_order = [reader.i32_at(64), reader.i32_at(68), reader.i32_at(72)];
        let mut seen = [false; 3];
        for &axis in &axis_order {
            if !(1..=3).contains(&axis) || std::mem::replace(&mut seen[axis as usize - 1], true) {
                return Err(DensityError::InvalidFormat(format!(
                    "invalid axis mapping: MAPC/MAPR/MAPS = {:?}",
                    axis_order
                )));
            }
        }
        let space_group = reader.i32_at(88).max(0) as u32;
        let nsymbt = reader.i32_at(92);
        if nsymbt < 0 {
            return Err(DensityError::InvalidFormat(format!(
                "negative extended header size: {nsymbt}"
            )));
        }
        let origin = Vector3::new(
            reader.f32_at(196) as f64,
            reader.f32_at(200) as f64,
            reader.f32_at(204) as f64,
        );

        let data_offset = HEADER_SIZE + nsymbt as usize;
        let data_bytes = bytes.get(data_offset..).ok_or_else(|| {
            DensityError::InvalidFormat("extended header runs past end of file".into())
        })?;
        let [nc, nr, ns] = dims.map(|d| d as usize);
        let flat = decode_values(data_bytes, mode, nc * nr * ns, reader.little_endian)?;

        // Column, row and section map onto the spatial axes named in MAPC/MAPR/MAPS.
        let axes = axis_order.map(|a| a as usize - 1);
        let mut extent = [0usize; 3];
        let mut start = [0i32; 3];
        for (file_axis, &spatial_axis) in axes.iter().enumerate() {
            extent[spatial_axis] = [nc, nr, ns][file_axis];
            start[spatial_axis] = file_starts[file_axis];
        }
        let mut data = Array3::<f32>::zeros((extent[0], extent[1], extent[2]));
        for s in 0..ns {
            for r in 0..nr {
                let row_start = (s * nr + r) * nc;
                for c in 0..nc {
                    let mut xyz = [0usize; 3];
                    xyz[axes[0]] = c;
                    xyz[axes[1]] = r;
                    xyz[axes[2]] = s;
                    data[xyz] = flat[row_start + c];
                }
            }
        }

        let cell = UnitCell::new(lengths, angles)?;
        let sampling = sampling.map(|m| m as usize);
        Ok(DensityMap::new(cell, sampling, start, data)?
            .with_origin(origin)
            .with_space_group(space_group))
    }

    pub fn read_from(reader: &mut impl Read) -> Result<DensityMap, DensityError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::read_from_bytes(&bytes)
    }

    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<DensityMap, DensityError> {
        let bytes = fs::read(path)?;
        Self::read_from_bytes(&bytes)
    }

    pub fn write_to(map: &DensityMap, writer: &mut impl Write) -> Result<(), DensityError> {
        let extent = map.extent();
        let stats = map.statistics();
        let mut header = vec![0u8; HEADER_SIZE];
        let mut put_i32 = |offset: usize, value: i32| {
            header[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        };
        for axis in 0..3 {
            put_i32(4 * axis, extent[axis] as i32);
            put_i32(16 + 4 * axis, map.start()[axis]);
            put_i32(28 + 4 * axis, map.sampling()[axis] as i32);
            put_i32(64 + 4 * axis, axis as i32 + 1);
        }
        put_i32(12, 2);
        put_i32(88, map.space_group() as i32);
        put_i32(220, 1);

        let mut put_f32 = |offset: usize, value: f64| {
            header[offset..offset + 4].copy_from_slice(&(value as f32).to_le_bytes());
        };
        let cell = map.cell();
        for axis in 0..3 {
            put_f32(40 + 4 * axis, cell.lengths[axis]);
            put_f32(52 + 4 * axis, cell.angles[axis]);
            put_f32(196 + 4 * axis, map.origin()[axis]);
        }
        put_f32(76, stats.min);
        put_f32(80, stats.max);
        put_f32(84, stats.mean);
        put_f32(216, stats.rms);

        header[208..212].copy_from_slice(MAP_MAGIC);
        header[212..216].copy_from_slice(&MACHST_LITTLE_ENDIAN);
        header[224..224 + LABEL.len()].copy_from_slice(LABEL.as_bytes());
        writer.write_all(&header)?;

        let data = map.data();
        let mut body = Vec::with_capacity(4 * data.len());
        for z in 0..extent[2] {
            for y in 0..extent[1] {
                for x in 0..extent[0] {
                    body.extend_from_slice(&data[[x, y, z]].to_le_bytes());
                }
            }
        }
        writer.write_all(&body)?;
        Ok(())
    }

    pub fn write_to_path<P: AsRef<Path>>(map: &DensityMap, path: P) -> Result<(), DensityError> {
        let file = fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(map, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use tempfile::NamedTempFile;

    struct TestHeader {
        dims: [i32; 3],
        mode: i32,
        axis_order: [i32; 3],
        little_endian: bool,
    }

    fn make_map_bytes(layout: &TestHeader, payload: &[u8]) -> Vec<u8> {
        let mut header = vec![0u8; HEADER_SIZE];
        let le = layout.little_endian;
        let mut put_i32 = |offset: usize, value: i32| {
            let bytes = if le { value.to_le_bytes() } else { value.to_be_bytes() };
            header[offset..offset + 4].copy_from_slice(&bytes);
        };
        for axis in 0..3 {
            put_i32(4 * axis, layout.dims[axis]);
            put_i32(64 + 4 * axis, layout.axis_order[axis]);
        }
        put_i32(12, layout.mode);
        put_i32(88, 1);
        let mut sampling = [0i32; 3];
        for (file_axis, &spatial) in layout.axis_order.iter().enumerate() {
            sampling[spatial as usize - 1] = layout.dims[file_axis];
        }
        for axis in 0..3 {
            put_i32(28 + 4 * axis, sampling[axis]);
        }
        let mut put_f32 = |offset: usize, value: f32| {
            let bytes = if le { value.to_le_bytes() } else { value.to_be_bytes() };
            header[offset..offset + 4].copy_from_slice(&bytes);
        };
        for axis in 0..3 {
            put_f32(40 + 4 * axis, 10.0);
            put_f32(52 + 4 * axis, 90.0);
        }
        header[208..212].copy_from_slice(MAP_MAGIC);
        header[212] = if le { 0x44 } else { 0x11 };

        let mut bytes = header;
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn reads_mode_2_in_xyz_order() {
        let values: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let layout = TestHeader {
            dims: [2, 3, 4],
            mode: 2,
            axis_order: [1, 2, 3],
            little_endian: true,
        };
        let map = Ccp4File::read_from_bytes(&make_map_bytes(&layout, &payload)).unwrap();

        assert_eq!(map.extent(), [2, 3, 4]);
        assert_eq!(map.sampling(), [2, 3, 4]);
        assert_eq!(map.data()[[1, 0, 0]], 1.0);
        assert_eq!(map.data()[[0, 1, 0]], 2.0);
        assert_eq!(map.data()[[0, 0, 1]], 6.0);
        assert_eq!(map.data()[[1, 2, 3]], 23.0);
    }

    #[test]
    fn permuted_axes_are_reordered() {
        let values: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let layout = TestHeader {
            dims: [2, 3, 4],
            mode: 2,
            axis_order: [3, 1, 2],
            little_endian: true,
        };
        let map = Ccp4File::read_from_bytes(&make_map_bytes(&layout, &payload)).unwrap();

        // Columns run along z, rows along x, sections along y.
        assert_eq!(map.extent(), [3, 4, 2]);
        assert_eq!(map.data()[[0, 0, 1]], 1.0);
        assert_eq!(map.data()[[1, 0, 0]], 2.0);
        assert_eq!(map.data()[[0, 1, 0]], 6.0);
    }

    #[test]
    fn reads_big_endian_integer_modes() {
        let values: Vec<i16> = (0..8).map(|v| v - 4).collect();
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        let layout = TestHeader {
            dims: [2, 2, 2],
            mode: 1,
            axis_order: [1, 2, 3],
            little_endian: false,
        };
        let map = Ccp4File::read_from_bytes(&make_map_bytes(&layout, &payload)).unwrap();

        assert_eq!(map.data()[[0, 0, 0]], -4.0);
        assert_eq!(map.data()[[1, 1, 1]], 3.0);
        assert_eq!(map.statistics().min, -4.0);
    }

    #[test]
    fn rejects_missing_magic_and_unsupported_modes() {
        let layout = TestHeader {
            dims: [1, 1, 1],
            mode: 4,
            axis_order: [1, 2, 3],
            little_endian: true,
        };
        let bytes = make_map_bytes(&layout, &[0u8; 8]);
        assert!(matches!(
            Ccp4File::read_from_bytes(&bytes),
            Err(DensityError::UnsupportedMode(4))
        ));

        let mut no_magic = bytes.clone();
        no_magic[208..212].copy_from_slice(b"XXXX");
        assert!(matches!(
            Ccp4File::read_from_bytes(&no_magic),
            Err(DensityError::InvalidFormat(_))
        ));

        assert!(Ccp4File::read_from_bytes(&bytes[..100]).is_err());
    }

    #[test]
    fn truncated_data_is_rejected() {
        let layout = TestHeader {
            dims: [2, 2, 2],
            mode: 2,
            axis_order: [1, 2, 3],
            little_endian: true,
        };
        let bytes = make_map_bytes(&layout, &[0u8; 12]);
        assert!(matches!(
            Ccp4File::read_from_bytes(&bytes),
            Err(DensityError::InvalidFormat(_))
        ));
    }

    #[test]
    fn written_maps_read_back_identically() {
        let cell = UnitCell::new([12.0, 14.0, 16.0], [90.0, 100.0, 90.0]).unwrap();
        let data = Array3::from_shape_fn((3, 4, 5), |(x, y, z)| (x * 20 + y * 5 + z) as f32 * 0.5);
        let map = DensityMap::new(cell, [24, 28, 32], [-1, 2, 3], data)
            .unwrap()
            .with_origin(Vector3::new(0.5, 0.0, -0.5));

        let file = NamedTempFile::new().unwrap();
        Ccp4File::write_to_path(&map, file.path()).unwrap();
        let reread = Ccp4File::read_from_path(file.path()).unwrap();

        assert_eq!(reread.extent(), map.extent());
        assert_eq!(reread.start(), map.start());
        assert_eq!(reread.sampling(), map.sampling());
        assert_eq!(reread.data(), map.data());
        let p = Point3::new(1.0, 2.0, 3.0);
        let a = map.cartesian_to_grid(&p);
        let b = reread.cartesian_to_grid(&p);
        for axis in 0..3 {
            assert!((a[axis] - b[axis]).abs() < 1e-4);
        }
    }
}
