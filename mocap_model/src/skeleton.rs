//! The joint hierarchy of a skinned model.
//!
//! Joints are identified by a hierarchical path like `root/hips/spine`.
//! The parent of a joint is the joint whose path is the same path with the last segment removed.
//! Joint ids are the positions in the original path list,
//! so vertex joint indices from the asset importer remain valid.
use std::collections::VecDeque;

use glam::Mat4;
use indexmap::IndexMap;
use indexmap::map::Entry;
use log::{error, warn};
use smol_str::SmolStr;

use crate::error::InvalidSkeletonError;
use crate::transform::try_inverse;

pub const PATH_SEPARATOR: char = '/';

/// A single node in the skeleton hierarchy.
#[derive(Debug, PartialEq, Clone)]
pub struct Joint {
    /// The index of this joint in [joints](SkeletonHierarchy::joints).
    pub id: usize,
    /// The last segment of [path](#structfield.path).
    pub name: SmolStr,
    pub path: SmolStr,
    /// The model space transform of the joint when the mesh was rigged.
    pub bind_transform: Mat4,
    /// The default transform of the joint relative to its parent.
    pub rest_transform: Mat4,
    /// The index of the parent [Joint] or `None` if this is a root joint.
    pub parent_index: Option<usize>,
}

/// An immutable collection of [Joint] with precomputed lookups.
///
/// The hierarchy can be shared freely between threads once built.
#[derive(Debug, PartialEq, Clone)]
pub struct SkeletonHierarchy {
    joints: Vec<Joint>,
    children: Vec<Vec<usize>>,
    evaluation_order: Vec<usize>,
    inverse_bind_transforms: Vec<Mat4>,
    path_to_id: IndexMap<SmolStr, usize>,
    name_to_id: IndexMap<SmolStr, usize>,
}

impl SkeletonHierarchy {
    /// Build the hierarchy from a flat list of joint paths
    /// with a bind and rest transform for each path.
    ///
    /// Every transform is converted to the target space as
    /// `coordinate_correction * transform * coordinate_correction^-1`.
    /// Paths can appear in any order.
    #[tracing::instrument(skip_all)]
    pub fn build<S: AsRef<str>>(
        paths: &[S],
        bind_transforms: &[Mat4],
        rest_transforms: &[Mat4],
        coordinate_correction: Mat4,
    ) -> Result<Self, InvalidSkeletonError> {
        if paths.is_empty() {
            return Err(InvalidSkeletonError::Empty);
        }
        if bind_transforms.len() != paths.len() {
            return Err(InvalidSkeletonError::BindTransformCount {
                expected: paths.len(),
                actual: bind_transforms.len(),
            });
        }
        if rest_transforms.len() != paths.len() {
            return Err(InvalidSkeletonError::RestTransformCount {
                expected: paths.len(),
                actual: rest_transforms.len(),
            });
        }

        let correction_inverse =
            try_inverse(coordinate_correction).map_err(InvalidSkeletonError::Correction)?;
        let correct = |m: Mat4| coordinate_correction * m * correction_inverse;

        // Index every path first so parents can appear after their children.
        let mut path_to_id = IndexMap::with_capacity(paths.len());
        for (index, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            if path.is_empty() {
                return Err(InvalidSkeletonError::EmptyPath { index });
            }
            match path_to_id.entry(SmolStr::from(path)) {
                Entry::Occupied(_) => {
                    return Err(InvalidSkeletonError::DuplicatePath {
                        path: path.to_string(),
                    });
                }
                Entry::Vacant(entry) => {
                    entry.insert(index);
                }
            }
        }

        let joints: Vec<_> = paths
            .iter()
            .zip(bind_transforms.iter().zip(rest_transforms))
            .enumerate()
            .map(|(id, (path, (bind, rest)))| {
                let path = path.as_ref();
                let (parent_path, name) = match path.rsplit_once(PATH_SEPARATOR) {
                    Some((parent, name)) => (Some(parent), name),
                    None => (None, path),
                };
                // Unresolved parents are treated as roots.
                let parent_index = parent_path.and_then(|p| path_to_id.get(p).copied());

                Joint {
                    id,
                    name: name.into(),
                    path: path.into(),
                    bind_transform: correct(*bind),
                    rest_transform: correct(*rest),
                    parent_index,
                }
            })
            .collect();

        let mut children = vec![Vec::new(); joints.len()];
        for joint in &joints {
            if let Some(parent) = joint.parent_index {
                children[parent].push(joint.id);
            }
        }

        let evaluation_order = evaluation_order(&joints, &children);

        let root_count = joints.iter().filter(|j| j.parent_index.is_none()).count();
        if root_count > 1 {
            warn!("Skeleton contains {root_count} root joints.");
        }

        let inverse_bind_transforms = joints
            .iter()
            .map(|joint| {
                try_inverse(joint.bind_transform).unwrap_or_else(|e| {
                    error!("Using identity inverse bind for joint {:?}: {e}", joint.path);
                    Mat4::IDENTITY
                })
            })
            .collect();

        let mut name_to_id = IndexMap::new();
        for joint in &joints {
            name_to_id.entry(joint.name.clone()).or_insert(joint.id);
        }

        Ok(Self {
            joints,
            children,
            evaluation_order,
            inverse_bind_transforms,
            path_to_id,
            name_to_id,
        })
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn joint(&self, id: usize) -> Option<&Joint> {
        self.joints.get(id)
    }

    /// The id of the joint with the full hierarchical `path`.
    pub fn joint_id(&self, path: &str) -> Option<usize> {
        self.path_to_id.get(path).copied()
    }

    /// The id of the first joint with the display `name`.
    pub fn joint_id_by_name(&self, name: &str) -> Option<usize> {
        self.name_to_id.get(name).copied()
    }

    pub fn children(&self, id: usize) -> &[usize] {
        self.children.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.joints
            .iter()
            .filter(|j| j.parent_index.is_none())
            .map(|j| j.id)
    }

    /// Joint ids ordered so that each joint appears after its parent.
    pub fn evaluation_order(&self) -> &[usize] {
        &self.evaluation_order
    }

    /// The inverse of each joint's bind transform.
    /// Non invertible bind transforms use the identity matrix.
    pub fn inverse_bind_transforms(&self) -> &[Mat4] {
        &self.inverse_bind_transforms
    }

    /// The rest transform for each joint relative to its parent.
    pub fn rest_pose(&self) -> Vec<Mat4> {
        self.joints.iter().map(|j| j.rest_transform).collect()
    }

    /// The model space transform for each joint by accumulating parent transforms.
    ///
    /// Joints without an entry in `local_transforms` use their rest transform.
    pub fn model_space_transforms(&self, local_transforms: &[Mat4]) -> Vec<Mat4> {
        let mut world_transforms = vec![Mat4::IDENTITY; self.joints.len()];

        for &i in &self.evaluation_order {
            let joint = &self.joints[i];
            let local = local_transforms
                .get(i)
                .copied()
                .unwrap_or(joint.rest_transform);

            world_transforms[i] = match joint.parent_index {
                Some(parent) => world_transforms[parent] * local,
                None => local,
            };
        }

        world_transforms
    }
}

fn evaluation_order(joints: &[Joint], children: &[Vec<usize>]) -> Vec<usize> {
    // Breadth first from the roots visits each parent before its children.
    let mut order = Vec::with_capacity(joints.len());
    let mut queue: VecDeque<_> = joints
        .iter()
        .filter(|j| j.parent_index.is_none())
        .map(|j| j.id)
        .collect();

    while let Some(id) = queue.pop_front() {
        order.push(id);
        queue.extend(children[id].iter().copied());
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;

    use glam::vec3;
    use pretty_assertions::assert_eq;

    fn identities(count: usize) -> Vec<Mat4> {
        vec![Mat4::IDENTITY; count]
    }

    #[test]
    fn build_empty() {
        assert_eq!(
            Err(InvalidSkeletonError::Empty),
            SkeletonHierarchy::build::<&str>(&[], &[], &[], Mat4::IDENTITY)
        );
    }

    #[test]
    fn build_mismatched_bind_transforms() {
        assert_eq!(
            Err(InvalidSkeletonError::BindTransformCount {
                expected: 2,
                actual: 1
            }),
            SkeletonHierarchy::build(&["a", "a/b"], &identities(1), &identities(2), Mat4::IDENTITY)
        );
    }

    #[test]
    fn build_mismatched_rest_transforms() {
        assert_eq!(
            Err(InvalidSkeletonError::RestTransformCount {
                expected: 2,
                actual: 3
            }),
            SkeletonHierarchy::build(&["a", "a/b"], &identities(2), &identities(3), Mat4::IDENTITY)
        );
    }

    #[test]
    fn build_duplicate_path() {
        assert_eq!(
            Err(InvalidSkeletonError::DuplicatePath {
                path: "a/b".to_string()
            }),
            SkeletonHierarchy::build(
                &["a", "a/b", "a/b"],
                &identities(3),
                &identities(3),
                Mat4::IDENTITY
            )
        );
    }

    #[test]
    fn build_empty_path() {
        assert_eq!(
            Err(InvalidSkeletonError::EmptyPath { index: 1 }),
            SkeletonHierarchy::build(&["a", ""], &identities(2), &identities(2), Mat4::IDENTITY)
        );
    }

    #[test]
    fn build_singular_correction() {
        assert!(matches!(
            SkeletonHierarchy::build(&["a"], &identities(1), &identities(1), Mat4::ZERO),
            Err(InvalidSkeletonError::Correction(_))
        ));
    }

    #[test]
    fn build_children_before_parents() {
        let skeleton = SkeletonHierarchy::build(
            &["root/hips/spine", "root", "root/hips", "root/hips/left_leg"],
            &identities(4),
            &identities(4),
            Mat4::IDENTITY,
        )
        .unwrap();

        let parents: Vec<_> = skeleton.joints().iter().map(|j| j.parent_index).collect();
        assert_eq!(vec![Some(2), None, Some(1), Some(2)], parents);

        let names: Vec<_> = skeleton.joints().iter().map(|j| j.name.as_str()).collect();
        assert_eq!(vec!["spine", "root", "hips", "left_leg"], names);

        assert_eq!(vec![1, 2, 0, 3], skeleton.evaluation_order());
        assert_eq!(&[0, 3], skeleton.children(2));
        assert_eq!(vec![1], skeleton.roots().collect::<Vec<_>>());
    }

    #[test]
    fn build_missing_parent_is_root() {
        let skeleton = SkeletonHierarchy::build(
            &["root", "other/arm"],
            &identities(2),
            &identities(2),
            Mat4::IDENTITY,
        )
        .unwrap();

        assert_eq!(None, skeleton.joints()[1].parent_index);
        assert_eq!(vec![0, 1], skeleton.roots().collect::<Vec<_>>());
    }

    #[test]
    fn evaluation_order_parents_first() {
        let skeleton = SkeletonHierarchy::build(
            &["a/b/c/d", "a/b/c", "a/b", "a"],
            &identities(4),
            &identities(4),
            Mat4::IDENTITY,
        )
        .unwrap();

        let order = skeleton.evaluation_order();
        for joint in skeleton.joints() {
            if let Some(parent) = joint.parent_index {
                let parent_position = order.iter().position(|i| *i == parent).unwrap();
                let position = order.iter().position(|i| *i == joint.id).unwrap();
                assert!(parent_position < position);
            }
        }
    }

    #[test]
    fn lookup_path_and_name() {
        let skeleton = SkeletonHierarchy::build(
            &["root", "root/hips", "root/hips/spine"],
            &identities(3),
            &identities(3),
            Mat4::IDENTITY,
        )
        .unwrap();

        assert_eq!(Some(1), skeleton.joint_id("root/hips"));
        assert_eq!(None, skeleton.joint_id("hips"));
        assert_eq!(Some(2), skeleton.joint_id_by_name("spine"));
        assert_eq!(None, skeleton.joint_id_by_name("head"));
    }

    #[test]
    fn coordinate_correction_applied() {
        let z_flip = Mat4::from_scale(vec3(1.0, 1.0, -1.0));
        let bind = Mat4::from_translation(vec3(1.0, 2.0, 3.0));
        let skeleton =
            SkeletonHierarchy::build(&["root"], &[bind], &[bind], z_flip).unwrap();

        let expected = Mat4::from_translation(vec3(1.0, 2.0, -3.0));
        assert!(skeleton.joints()[0].bind_transform.abs_diff_eq(expected, 0.0001));
        assert!(skeleton.joints()[0].rest_transform.abs_diff_eq(expected, 0.0001));
        assert!(
            skeleton.inverse_bind_transforms()[0]
                .abs_diff_eq(Mat4::from_translation(vec3(-1.0, -2.0, 3.0)), 0.0001)
        );
    }

    #[test]
    fn singular_bind_uses_identity_inverse() {
        let skeleton =
            SkeletonHierarchy::build(&["root"], &[Mat4::ZERO], &identities(1), Mat4::IDENTITY)
                .unwrap();
        assert_eq!(&[Mat4::IDENTITY], skeleton.inverse_bind_transforms());
    }

    #[test]
    fn model_space_transforms_rest_pose() {
        let skeleton = SkeletonHierarchy::build(
            &["root", "root/child"],
            &identities(2),
            &[
                Mat4::from_translation(vec3(0.0, 1.0, 0.0)),
                Mat4::from_translation(vec3(0.0, 2.0, 0.0)),
            ],
            Mat4::IDENTITY,
        )
        .unwrap();

        let transforms = skeleton.model_space_transforms(&[]);
        assert_eq!(
            vec![
                Mat4::from_translation(vec3(0.0, 1.0, 0.0)),
                Mat4::from_translation(vec3(0.0, 3.0, 0.0)),
            ],
            transforms
        );
    }
}
