//! 6-connected component labelling.

use std::collections::VecDeque;

use crate::error::{CoreError, Result};

/// Result of labelling a volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Components {
    /// Component id per voxel; 0 is background, ids start at 1.
    pub labels: Vec<u32>,
    /// Voxel count per component, indexed by `id - 1`.
    pub sizes: Vec<usize>,
    /// Voxel class shared by all voxels of a component, indexed by `id - 1`.
    pub classes: Vec<u32>,
}

impl Components {
    pub fn count(&self) -> usize {
        self.sizes.len()
    }
}

/// Label 6-connected components of non-zero voxels.
///
/// Two neighbouring voxels join the same component only when they carry the
/// same class value, so a multi-label mask is split per label. Components are
/// numbered in storage order of their first voxel, which makes the labelling
/// deterministic.
pub fn label_components(values: &[f32], shape: [usize; 3]) -> Result<Components> {
    let [d, h, w] = shape;
    if values.len() != d * h * w {
        return Err(CoreError::grid_mismatch(
            "component labelling",
            format!("{} voxels for shape {:?}", values.len(), shape),
        ));
    }

    let class_of = |i: usize| values[i].round().max(0.0) as u32;

    let mut labels = vec![0u32; values.len()];
    let mut sizes = Vec::new();
    let mut classes = Vec::new();
    let mut queue = VecDeque::new();

    for seed in 0..values.len() {
        let class = class_of(seed);
        if class == 0 || labels[seed] != 0 {
            continue;
        }

        let id = sizes.len() as u32 + 1;
        labels[seed] = id;
        queue.push_back(seed);
        let mut size = 0;

        while let Some(i) = queue.pop_front() {
            size += 1;
            let z = i / (h * w);
            let y = (i / w) % h;
            let x = i % w;

            let mut visit = |j: usize| {
                if labels[j] == 0 && class_of(j) == class {
                    labels[j] = id;
                    queue.push_back(j);
                }
            };
            if x > 0 {
                visit(i - 1);
            }
            if x + 1 < w {
                visit(i + 1);
            }
            if y > 0 {
                visit(i - w);
            }
            if y + 1 < h {
                visit(i + w);
            }
            if z > 0 {
                visit(i - h * w);
            }
            if z + 1 < d {
                visit(i + h * w);
            }
        }

        sizes.push(size);
        classes.push(class);
    }

    Ok(Components {
        labels,
        sizes,
        classes,
    })
}
