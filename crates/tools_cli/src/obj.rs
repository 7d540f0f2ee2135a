//! Wavefront OBJ export of built chunk meshes

use anyhow::Context;
use glam::{IVec3, Vec3};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use voxel_terrain::{ChunkDims, MeshConsumer, MeshUpload};

/// Collects chunk meshes and writes them as one world-space OBJ
#[derive(Debug)]
pub struct ObjExporter {
    dims: ChunkDims,
    /// Keyed by coordinate array so output order is stable
    meshes: BTreeMap<[i32; 3], MeshUpload>,
}

impl ObjExporter {
    pub fn new(dims: ChunkDims) -> Self {
        Self { dims, meshes: BTreeMap::new() }
    }

    pub fn chunk_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.values().map(MeshUpload::triangle_count).sum()
    }

    /// Vertex lines carry RGB after the position (`v x y z r g b`)
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "# voxel terrain, {} chunks", self.meshes.len())?;

        let mut base = 1u32;
        for (coord, mesh) in &self.meshes {
            let origin = self.dims.origin(IVec3::from_array(*coord)).as_vec3();
            writeln!(out, "o chunk_{}_{}_{}", coord[0], coord[1], coord[2])?;

            for (p, c) in mesh.positions.iter().zip(&mesh.colors) {
                let p = origin + Vec3::from_array(*p);
                writeln!(
                    out,
                    "v {} {} {} {:.3} {:.3} {:.3}",
                    p.x,
                    p.y,
                    p.z,
                    c[0] as f32 / 255.0,
                    c[1] as f32 / 255.0,
                    c[2] as f32 / 255.0
                )?;
            }
            for tri in mesh.indices.chunks_exact(3) {
                writeln!(out, "f {} {} {}", base + tri[0], base + tri[1], base + tri[2])?;
            }
            base += mesh.positions.len() as u32;
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut out = BufWriter::new(file);
        self.write_to(&mut out)?;
        out.flush()?;
        Ok(())
    }
}

impl MeshConsumer for ObjExporter {
    fn upload(&mut self, coord: IVec3, mesh: MeshUpload) {
        self.meshes.insert(coord.to_array(), mesh);
    }

    fn discard(&mut self, coord: IVec3) {
        self.meshes.remove(&coord.to_array());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> MeshUpload {
        MeshUpload {
            positions: vec![[0.0, 1.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 1.0]],
            indices: vec![0, 1, 2],
            colors: vec![[255, 0, 0, 255]; 3],
        }
    }

    #[test]
    fn test_write_offsets_chunks_and_indices() {
        let mut exporter = ObjExporter::new(ChunkDims::new(4, 8));
        exporter.upload(IVec3::new(1, 0, 0), triangle());
        exporter.upload(IVec3::new(0, 0, 0), triangle());

        let mut out = Vec::new();
        exporter.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let faces: Vec<&str> = text.lines().filter(|l| l.starts_with("f ")).collect();
        assert_eq!(faces, vec!["f 1 2 3", "f 4 5 6"]);
        assert!(text.contains("o chunk_1_0_0"));
        // second chunk is shifted by one chunk width
        assert!(text.contains("v 5 1 0 1.000 0.000 0.000"));
        assert_eq!(text.lines().filter(|l| l.starts_with("v ")).count(), 6);
    }

    #[test]
    fn test_discard_drops_chunk() {
        let mut exporter = ObjExporter::new(ChunkDims::new(4, 8));
        exporter.upload(IVec3::ZERO, triangle());
        assert_eq!(exporter.triangle_count(), 1);
        exporter.discard(IVec3::ZERO);
        assert_eq!(exporter.chunk_count(), 0);
    }
}
