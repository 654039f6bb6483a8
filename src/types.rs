use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Number of joints the body tracker reports per body.
pub const JOINT_COUNT: usize = 32;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quat {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }
}

impl Default for Quat {
    fn default() -> Self {
        Quat::IDENTITY
    }
}

/// Joint pose in engine space: centimetres, left-handed, +X forward, +Y right, +Z up.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JointTransform {
    pub position: Vec3,
    pub rotation: Quat,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Skeleton {
    /// Tracker-assigned body id. Opaque; not stable across sessions.
    pub id: u32,
    /// Joint transforms in [`BodyJoint`] order. Empty for the null skeleton.
    pub joints: Vec<JointTransform>,
}

impl Skeleton {
    /// The null skeleton handed out when no tracking data is available.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn joint(&self, joint: BodyJoint) -> Option<&JointTransform> {
        self.joints.get(joint.index())
    }
}

/// Complete result of one body-tracking pass.
///
/// The tracked count is fixed at construction from the skeleton list, so a
/// snapshot can never carry a count that disagrees with its contents.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkeletonSnapshot {
    tracked: usize,
    skeletons: Vec<Skeleton>,
}

impl SkeletonSnapshot {
    pub fn new(skeletons: Vec<Skeleton>) -> Self {
        Self {
            tracked: skeletons.len(),
            skeletons,
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked
    }

    pub fn skeletons(&self) -> &[Skeleton] {
        &self.skeletons
    }

    pub fn into_skeletons(self) -> Vec<Skeleton> {
        self.skeletons
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelLayout {
    /// Colour camera output, passed through untouched.
    Bgra8,
    /// Expanded depth, infrared, or body-index data.
    Rgba8,
}

impl ChannelLayout {
    pub fn bytes_per_pixel(&self) -> usize {
        4
    }
}

/// Display-ready image handed to a frame sink by value.
#[derive(Clone, Debug)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub row_pitch: usize,
    pub layout: ChannelLayout,
    pub bytes: Vec<u8>,
    pub timestamp: Instant,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, layout: ChannelLayout, bytes: Vec<u8>) -> Self {
        Self {
            width,
            height,
            row_pitch: width as usize * layout.bytes_per_pixel(),
            layout,
            bytes,
            timestamp: Instant::now(),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyJoint {
    Pelvis,
    SpineNavel,
    SpineChest,
    Neck,
    ClavicleLeft,
    ShoulderLeft,
    ElbowLeft,
    WristLeft,
    HandLeft,
    HandtipLeft,
    ThumbLeft,
    ClavicleRight,
    ShoulderRight,
    ElbowRight,
    WristRight,
    HandRight,
    HandtipRight,
    ThumbRight,
    HipLeft,
    KneeLeft,
    AnkleLeft,
    FootLeft,
    HipRight,
    KneeRight,
    AnkleRight,
    FootRight,
    Head,
    Nose,
    EyeLeft,
    EarLeft,
    EyeRight,
    EarRight,
}

impl BodyJoint {
    /// All joints in tracker order.
    pub const ALL: [BodyJoint; JOINT_COUNT] = [
        BodyJoint::Pelvis,
        BodyJoint::SpineNavel,
        BodyJoint::SpineChest,
        BodyJoint::Neck,
        BodyJoint::ClavicleLeft,
        BodyJoint::ShoulderLeft,
        BodyJoint::ElbowLeft,
        BodyJoint::WristLeft,
        BodyJoint::HandLeft,
        BodyJoint::HandtipLeft,
        BodyJoint::ThumbLeft,
        BodyJoint::ClavicleRight,
        BodyJoint::ShoulderRight,
        BodyJoint::ElbowRight,
        BodyJoint::WristRight,
        BodyJoint::HandRight,
        BodyJoint::HandtipRight,
        BodyJoint::ThumbRight,
        BodyJoint::HipLeft,
        BodyJoint::KneeLeft,
        BodyJoint::AnkleLeft,
        BodyJoint::FootLeft,
        BodyJoint::HipRight,
        BodyJoint::KneeRight,
        BodyJoint::AnkleRight,
        BodyJoint::FootRight,
        BodyJoint::Head,
        BodyJoint::Nose,
        BodyJoint::EyeLeft,
        BodyJoint::EarLeft,
        BodyJoint::EyeRight,
        BodyJoint::EarRight,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<BodyJoint> {
        Self::ALL.get(index).copied()
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BodyJoint::Pelvis => "Pelvis",
            BodyJoint::SpineNavel => "Spine Navel",
            BodyJoint::SpineChest => "Spine Chest",
            BodyJoint::Neck => "Neck",
            BodyJoint::ClavicleLeft => "Clavicle Left",
            BodyJoint::ShoulderLeft => "Shoulder Left",
            BodyJoint::ElbowLeft => "Elbow Left",
            BodyJoint::WristLeft => "Wrist Left",
            BodyJoint::HandLeft => "Hand Left",
            BodyJoint::HandtipLeft => "Hand Tip Left",
            BodyJoint::ThumbLeft => "Thumb Left",
            BodyJoint::ClavicleRight => "Clavicle Right",
            BodyJoint::ShoulderRight => "Shoulder Right",
            BodyJoint::ElbowRight => "Elbow Right",
            BodyJoint::WristRight => "Wrist Right",
            BodyJoint::HandRight => "Hand Right",
            BodyJoint::HandtipRight => "Hand Tip Right",
            BodyJoint::ThumbRight => "Thumb Right",
            BodyJoint::HipLeft => "Hip Left",
            BodyJoint::KneeLeft => "Knee Left",
            BodyJoint::AnkleLeft => "Ankle Left",
            BodyJoint::FootLeft => "Foot Left",
            BodyJoint::HipRight => "Hip Right",
            BodyJoint::KneeRight => "Knee Right",
            BodyJoint::AnkleRight => "Ankle Right",
            BodyJoint::FootRight => "Foot Right",
            BodyJoint::Head => "Head",
            BodyJoint::Nose => "Nose",
            BodyJoint::EyeLeft => "Eye Left",
            BodyJoint::EarLeft => "Ear Left",
            BodyJoint::EyeRight => "Eye Right",
            BodyJoint::EarRight => "Ear Right",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joint_order_matches_indices() {
        for (idx, joint) in BodyJoint::ALL.iter().enumerate() {
            assert_eq!(joint.index(), idx);
            assert_eq!(BodyJoint::from_index(idx), Some(*joint));
        }
        assert_eq!(BodyJoint::from_index(JOINT_COUNT), None);
        assert_eq!(BodyJoint::EarRight.index(), 31);
    }

    #[test]
    fn display_names_are_unique() {
        let mut names: Vec<_> = BodyJoint::ALL.iter().map(BodyJoint::display_name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), JOINT_COUNT);
        assert_eq!(BodyJoint::HandtipLeft.display_name(), "Hand Tip Left");
    }

    #[test]
    fn snapshot_count_follows_contents() {
        let snapshot = SkeletonSnapshot::new(vec![Skeleton::empty(), Skeleton::empty()]);
        assert_eq!(snapshot.tracked_count(), 2);
        assert_eq!(snapshot.skeletons().len(), 2);
        assert_eq!(SkeletonSnapshot::default().tracked_count(), 0);
    }

    #[test]
    fn pixel_buffer_pitch_is_four_bytes_per_pixel() {
        let buffer = PixelBuffer::new(3, 2, ChannelLayout::Rgba8, vec![0; 24]);
        assert_eq!(buffer.row_pitch, 12);
        assert_eq!(buffer.bytes.len(), buffer.row_pitch * buffer.height as usize);
    }
}
