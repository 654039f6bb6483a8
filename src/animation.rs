//! Binds tracked skeletons onto a named bone hierarchy.
//!
//! The consumer polls the skeleton store on its own update tick and asks a
//! [`BoneMap`] which bones to rotate. Only the rotational part of each joint
//! transform is applied; positions stay with the target rig.

use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    types::{BodyJoint, Quat, Skeleton},
};

/// Rotation to apply to one bone of the target rig.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneRotation {
    /// Index of the bone as reported by the lookup.
    pub bone: usize,
    pub joint: BodyJoint,
    pub rotation: Quat,
}

/// Optional target bone name per tracker joint.
///
/// Serialized as a table of `joint = "bone"` pairs, e.g.
/// `spine_chest = "spine_03"`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoneMap {
    bones: BTreeMap<BodyJoint, String>,
}

impl BoneMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Maps `joint` to `bone`, returning the previous bone if any.
    pub fn insert(&mut self, joint: BodyJoint, bone: impl Into<String>) -> Option<String> {
        self.bones.insert(joint, bone.into())
    }

    pub fn remove(&mut self, joint: BodyJoint) -> Option<String> {
        self.bones.remove(&joint)
    }

    pub fn bone(&self, joint: BodyJoint) -> Option<&str> {
        self.bones.get(&joint).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// Rotations for every mapped joint whose bone `lookup` recognises, in
    /// joint order. Unmapped joints and unknown bones are skipped, as is
    /// everything for the null skeleton.
    pub fn resolve<F>(&self, skeleton: &Skeleton, lookup: F) -> Vec<BoneRotation>
    where
        F: Fn(&str) -> Option<usize>,
    {
        self.bones
            .iter()
            .filter_map(|(&joint, name)| {
                let transform = skeleton.joint(joint)?;
                let bone = lookup(name)?;
                Some(BoneRotation {
                    bone,
                    joint,
                    rotation: transform.rotation,
                })
            })
            .collect()
    }
}

impl FromIterator<(BodyJoint, String)> for BoneMap {
    fn from_iter<I: IntoIterator<Item = (BodyJoint, String)>>(iter: I) -> Self {
        Self {
            bones: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JOINT_COUNT, JointTransform, Vec3};
    use std::io::Write;

    fn skeleton() -> Skeleton {
        let joints = (0..JOINT_COUNT)
            .map(|i| JointTransform {
                position: Vec3::new(i as f32, 0.0, 0.0),
                rotation: Quat::new(1.0, i as f32, 0.0, 0.0),
            })
            .collect();
        Skeleton { id: 7, joints }
    }

    fn rig(name: &str) -> Option<usize> {
        ["hips", "neck_01", "hand_l"].iter().position(|bone| *bone == name)
    }

    #[test]
    fn resolves_rotation_for_known_bones_only() {
        let mut map = BoneMap::new();
        map.insert(BodyJoint::Pelvis, "hips");
        map.insert(BodyJoint::HandLeft, "hand_l");
        map.insert(BodyJoint::Head, "head_missing_from_rig");

        let rotations = map.resolve(&skeleton(), rig);
        assert_eq!(rotations.len(), 2);
        assert_eq!(rotations[0].bone, 0);
        assert_eq!(rotations[0].joint, BodyJoint::Pelvis);
        assert_eq!(rotations[0].rotation, Quat::new(1.0, 0.0, 0.0, 0.0));
        assert_eq!(rotations[1].bone, 2);
        assert_eq!(
            rotations[1].rotation,
            Quat::new(1.0, BodyJoint::HandLeft.index() as f32, 0.0, 0.0)
        );
    }

    #[test]
    fn null_skeleton_resolves_to_nothing() {
        let map: BoneMap = [(BodyJoint::Neck, "neck_01".to_string())]
            .into_iter()
            .collect();
        assert!(map.resolve(&Skeleton::empty(), rig).is_empty());
    }

    #[test]
    fn loads_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pelvis = \"hips\"\nspine_chest = \"spine_03\"").unwrap();

        let map = BoneMap::from_file(file.path()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.bone(BodyJoint::Pelvis), Some("hips"));
        assert_eq!(map.bone(BodyJoint::SpineChest), Some("spine_03"));
        assert_eq!(map.bone(BodyJoint::Head), None);
    }

    #[test]
    fn unknown_joint_names_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tail = \"tail_01\"").unwrap();
        assert!(matches!(
            BoneMap::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
