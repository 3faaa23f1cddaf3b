use std::{
    fs::{create_dir_all, File},
    io::{BufWriter, Write},
    path::PathBuf,
};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::{PciSphSolver, SurfaceOps, V3};

/**
 * Writes one binary snapshot per frame for downstream playback:
 * `<basename>-00001.pos` with the particle positions, and (when the
 * collider carries a mesh) `<basename>-terrain-00001.mesh` with the
 * terrain vertices. Both files are a little-endian u32 count followed by
 * f64 x/y/z triplets.
 */
pub(crate) struct SnapshotExporter {
    folder: PathBuf,
    basename: String,
    snapshot_number: usize,
}

impl SnapshotExporter {
    pub(crate) fn new(folder: impl Into<PathBuf>, basename: impl Into<String>) -> SnapshotExporter {
        let folder: PathBuf = folder.into();
        create_dir_all(&folder).unwrap();
        SnapshotExporter {
            folder,
            basename: basename.into(),
            snapshot_number: 1,
        }
    }

    pub(crate) fn add_snapshot(&mut self, solver: &PciSphSolver) {
        let positions_path = self
            .folder
            .join(format!("{}-{:05}.pos", self.basename, self.snapshot_number));
        write_points_file(&positions_path, &solver.particles().positions);

        if let Some(collider) = solver.collider() {
            if let Some(vertices) = collider.surface.mesh_vertices() {
                let terrain_path = self
                    .folder
                    .join(format!("{}-terrain-{:05}.mesh", self.basename, self.snapshot_number));
                write_points_file(&terrain_path, &vertices);
            }
        }

        self.snapshot_number += 1;
    }
}

fn write_points_file(path: &PathBuf, points: &[V3]) {
    let mut file = BufWriter::new(File::create(path).expect("failed creating snapshot file"));
    file.write_u32::<LittleEndian>(points.len() as u32).unwrap();
    for p in points {
        file.write_f64::<LittleEndian>(p.x as f64).unwrap();
        file.write_f64::<LittleEndian>(p.y as f64).unwrap();
        file.write_f64::<LittleEndian>(p.z as f64).unwrap();
    }
    file.flush().unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3f;
    use byteorder::ReadBytesExt;
    use std::io::Read;

    #[test]
    fn snapshot_files_roundtrip() {
        let dir = std::env::temp_dir().join("erosive-sph-snapshot-test");
        let points = vec![vec3f(1., 2., 3.), vec3f(-0.5, 0., 4.25)];
        let path = dir.clone().join("points.pos");
        create_dir_all(&dir).unwrap();
        write_points_file(&path, &points);

        let mut file = File::open(&path).unwrap();
        let count = file.read_u32::<LittleEndian>().unwrap();
        assert_eq!(count, 2);
        let mut values = Vec::new();
        for _ in 0..count * 3 {
            values.push(file.read_f64::<LittleEndian>().unwrap());
        }
        assert_eq!(values, vec![1., 2., 3., -0.5, 0., 4.25]);

        let mut rest = Vec::new();
        file.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    }
}
