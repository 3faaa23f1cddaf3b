use crate::{bounding_box::BoundingBox, floating_type_mod::FT, V3};

/**
 * Body-centered-cubic lattice point generator. Used to seed emitter volumes
 * and to build the synthetic neighbor configuration for the PCISPH
 * stiffness coefficient.
 */
pub struct BccLatticePointGenerator;

impl BccLatticePointGenerator {
    /**
     * Visit every lattice point inside `bbox` at the given spacing. The
     * callback returns `false` to stop the enumeration early (emitters use
     * this when their particle budget runs out).
     */
    pub fn for_each_point(bbox: &BoundingBox, spacing: FT, mut callback: impl FnMut(V3) -> bool) {
        let half_spacing = spacing * 0.5;
        let box_width = bbox.width();
        let box_height = bbox.height();
        let box_depth = bbox.depth();

        if spacing <= 0. || box_width < 0. || box_height < 0. || box_depth < 0. {
            return;
        }

        let mut pos = V3::zeros();
        let mut has_offset = false;

        let mut k = 0;
        loop {
            pos.z = k as FT * half_spacing + bbox.lower_corner.z;
            if pos.z > bbox.lower_corner.z + box_depth {
                break;
            }

            let offset = if has_offset { half_spacing } else { 0. };

            let mut j = 0;
            loop {
                pos.y = j as FT * spacing + offset + bbox.lower_corner.y;
                if pos.y > bbox.lower_corner.y + box_height {
                    break;
                }

                let mut i = 0;
                loop {
                    pos.x = i as FT * spacing + offset + bbox.lower_corner.x;
                    if pos.x > bbox.lower_corner.x + box_width {
                        break;
                    }
                    if !callback(pos) {
                        return;
                    }
                    i += 1;
                }
                j += 1;
            }

            has_offset = !has_offset;
            k += 1;
        }
    }

    pub fn generate(bbox: &BoundingBox, spacing: FT) -> Vec<V3> {
        let mut points = Vec::new();
        Self::for_each_point(bbox, spacing, |p| {
            points.push(p);
            true
        });
        points
    }
}

#[test]
fn bcc_lattice_fills_box() {
    use crate::vec3f;

    let bbox = BoundingBox::new(vec3f(0., 0., 0.), vec3f(1., 1., 1.));
    let points = BccLatticePointGenerator::generate(&bbox, 0.25);

    assert!(!points.is_empty());
    for p in &points {
        assert!(bbox.contains(*p), "point {:?} escaped the box", p);
    }

    // alternating layers must be offset against each other
    let base_layer: Vec<_> = points.iter().filter(|p| p.z == 0.).collect();
    let offset_layer: Vec<_> = points.iter().filter(|p| p.z == 0.125).collect();
    assert!(!base_layer.is_empty());
    assert!(!offset_layer.is_empty());
    assert!(base_layer.iter().all(|p| p.x == 0. || p.x % 0.25 == 0.));
    assert!(offset_layer.iter().all(|p| (p.x - 0.125) % 0.25 == 0.));
}

#[test]
fn bcc_lattice_early_stop() {
    use crate::vec3f;

    let bbox = BoundingBox::new(vec3f(0., 0., 0.), vec3f(1., 1., 1.));
    let mut visited = 0;
    BccLatticePointGenerator::for_each_point(&bbox, 0.1, |_| {
        visited += 1;
        visited < 7
    });
    assert_eq!(visited, 7);
}
