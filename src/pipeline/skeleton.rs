use crate::{
    device::{BodyFrame, TrackedBody, VendorJoint},
    types::{JointTransform, Quat, Skeleton, SkeletonSnapshot, Vec3},
};

const MM_TO_CM: f32 = 0.1;

/// Converts a tracker joint into engine space.
///
/// ```text
/// tracker [mm]          engine [cm]
/// +X right        ->    +Y
/// +Y down         ->    -Z
/// +Z forward      ->    +X
/// ```
///
/// The x and y quaternion components are negated to go from the tracker's
/// right-handed frame to the engine's left-handed one.
pub fn to_engine_transform(joint: &VendorJoint) -> JointTransform {
    let [px, py, pz] = joint.position;
    let [w, x, y, z] = joint.orientation;

    JointTransform {
        position: Vec3::new(pz * MM_TO_CM, px * MM_TO_CM, -py * MM_TO_CM),
        rotation: Quat::new(w, -x, -y, z),
    }
}

pub fn to_skeleton(body: &TrackedBody) -> Skeleton {
    Skeleton {
        id: body.id,
        joints: body.joints.iter().map(to_engine_transform).collect(),
    }
}

/// Builds the full snapshot for one tracker frame, keeping tracker order.
pub fn to_snapshot(frame: &BodyFrame) -> SkeletonSnapshot {
    SkeletonSnapshot::new(frame.bodies.iter().map(to_skeleton).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JOINT_COUNT;

    fn joint(position: [f32; 3], orientation: [f32; 4]) -> VendorJoint {
        VendorJoint {
            position,
            orientation,
        }
    }

    const IDENTITY: [f32; 4] = [1.0, 0.0, 0.0, 0.0];

    #[test]
    fn forward_maps_to_engine_x() {
        let t = to_engine_transform(&joint([0.0, 0.0, 1000.0], IDENTITY));
        assert_eq!(t.position, Vec3::new(100.0, 0.0, 0.0));
    }

    #[test]
    fn right_maps_to_engine_y() {
        let t = to_engine_transform(&joint([1000.0, 0.0, 0.0], IDENTITY));
        assert_eq!(t.position, Vec3::new(0.0, 100.0, 0.0));
    }

    #[test]
    fn down_maps_to_negative_engine_z() {
        let t = to_engine_transform(&joint([0.0, 1000.0, 0.0], IDENTITY));
        assert_eq!(t.position, Vec3::new(0.0, 0.0, -100.0));
    }

    #[test]
    fn orientation_negates_x_and_y() {
        let identity = to_engine_transform(&joint([0.0; 3], IDENTITY));
        assert_eq!(identity.rotation, Quat::IDENTITY);

        let about_x = to_engine_transform(&joint([0.0; 3], [0.0, 1.0, 0.0, 0.0]));
        assert_eq!(about_x.rotation, Quat::new(0.0, -1.0, 0.0, 0.0));

        let mixed = to_engine_transform(&joint([0.0; 3], [0.5, 0.5, 0.5, 0.5]));
        assert_eq!(mixed.rotation, Quat::new(0.5, -0.5, -0.5, 0.5));
    }

    #[test]
    fn snapshot_keeps_tracker_order_and_ids() {
        let body = |id: u32, x: f32| TrackedBody {
            id,
            joints: [joint([x, 0.0, 0.0], IDENTITY); JOINT_COUNT],
        };
        let frame = BodyFrame {
            bodies: vec![body(7, 10.0), body(3, 20.0)],
            body_index_map: None,
        };

        let snapshot = to_snapshot(&frame);
        assert_eq!(snapshot.tracked_count(), 2);
        let ids: Vec<u32> = snapshot.skeletons().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![7, 3]);
        for skeleton in snapshot.skeletons() {
            assert_eq!(skeleton.joints.len(), JOINT_COUNT);
        }
        assert_eq!(snapshot.skeletons()[1].joints[0].position.y, 2.0);
    }
}
