//! End-to-end scenarios for joints, trees and their notifications.

use std::cell::{Cell, RefCell};
use std::f64::consts::FRAC_PI_2;
use std::rc::Rc;

use approx::assert_relative_eq;
use nalgebra::{DVector, Isometry3, Matrix3, Point3, Vector3};
use sim_kinematics::{
    BallJoint, ChildChanged, Connection, FrameChanged, FrameTree, FreeJoint, Joint, Signal,
};
use sim_types::{EntityOptions, FrameId, JointProperties, KinematicsError};

// =============================================================================
// Ball joint scenarios
// =============================================================================

#[test]
fn quarter_turn_differences_and_transform() {
    let joint = BallJoint::new(JointProperties::new("ball"));
    let target = Vector3::new(0.0, 0.0, FRAC_PI_2);

    let diff = joint.position_differences(&Vector3::zeros(), &target);
    assert_relative_eq!(diff, target, epsilon = 1e-9);

    let tf = BallJoint::convert_to_transform(&target);
    let expected = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    assert_relative_eq!(
        *tf.rotation.to_rotation_matrix().matrix(),
        expected,
        epsilon = 1e-12
    );
    assert_relative_eq!(tf.translation.vector, Vector3::zeros(), epsilon = 1e-12);
}

#[test]
fn integrating_spin_reaches_quarter_turn() {
    let omega = Vector3::new(0.0, 0.0, 1.0);
    let duration = 1.5708;

    for steps in [1_u32, 4, 16] {
        let mut joint = BallJoint::new(JointProperties::new("ball"));
        joint.set_velocities(omega);
        let dt = duration / f64::from(steps);
        for _ in 0..steps {
            joint.integrate_positions(dt).unwrap();
        }

        let tf = joint.local_transform();
        let tip = tf * Point3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(tip, Point3::new(0.0, 1.0, 0.0), epsilon = 1e-4);
        assert_relative_eq!(joint.positions().z, duration, epsilon = 1e-9);
    }
}

// =============================================================================
// Tree scenarios
// =============================================================================

#[test]
fn quiet_entity_reparenting_leaves_child_sets_alone() {
    let mut tree = FrameTree::new();
    let f = tree
        .add_frame(FrameId::WORLD, "F", Isometry3::translation(0.0, 1.0, 0.0))
        .unwrap();
    let g = tree
        .add_frame(f, "G", Isometry3::translation(0.0, 0.0, 1.0))
        .unwrap();

    let hooks = Rc::new(Cell::new(0));
    for frame in [FrameId::WORLD, f, g] {
        let signals = tree.frame_signals(frame).unwrap();
        let added = Rc::clone(&hooks);
        signals
            .on_child_added()
            .connect(move |_| added.set(added.get() + 1));
        let removed = Rc::clone(&hooks);
        signals
            .on_child_removed()
            .connect(move |_| removed.set(removed.get() + 1));
    }

    let counts = |tree: &FrameTree| {
        [FrameId::WORLD, f, g].map(|frame| tree.num_child_entities(frame))
    };
    let before = counts(&tree);

    let q = tree.add_entity(f, "gauge", EntityOptions::quiet()).unwrap();
    tree.set_parent_frame(q, g).unwrap();

    assert_eq!(counts(&tree), before);
    assert_eq!(hooks.get(), 0);
    assert_eq!(tree.parent_frame(q), Some(g));
    assert!(tree.descends_from(q, g));
    assert!(tree.descends_from(q, f));
    assert!(tree.descends_from(q, FrameId::WORLD));
    assert_relative_eq!(
        tree.world_transform(q).unwrap().translation.vector,
        Vector3::new(0.0, 1.0, 1.0),
        epsilon = 1e-12
    );
}

#[test]
fn joint_drives_frame_chain() {
    let mut tree = FrameTree::new();
    let mut shoulder = BallJoint::new(
        JointProperties::new("shoulder").with_parent_to_joint(Isometry3::translation(0.0, 0.0, 1.0)),
    );
    let mut elbow = BallJoint::new(
        JointProperties::new("elbow").with_child_to_joint(Isometry3::translation(-1.0, 0.0, 0.0)),
    );

    let upper = tree
        .add_frame(FrameId::WORLD, "upper", shoulder.local_transform())
        .unwrap();
    let fore = tree.add_frame(upper, "fore", elbow.local_transform()).unwrap();
    let hand = tree
        .add_entity(fore, "hand", EntityOptions::default())
        .unwrap();

    assert_relative_eq!(
        tree.world_transform(hand).unwrap().translation.vector,
        Vector3::new(1.0, 0.0, 1.0),
        epsilon = 1e-12
    );

    let moved = Rc::new(Cell::new(0));
    let sink = Rc::clone(&moved);
    tree.signals(hand)
        .unwrap()
        .on_transform_updated()
        .connect(move |_| sink.set(sink.get() + 1));

    shoulder.set_positions(Vector3::new(0.0, 0.0, FRAC_PI_2));
    elbow.set_positions(Vector3::new(0.0, -FRAC_PI_2, 0.0));
    tree.set_relative_transform(upper, shoulder.local_transform())
        .unwrap();
    tree.set_relative_transform(fore, elbow.local_transform())
        .unwrap();

    assert_eq!(moved.get(), 2);
    assert!(tree.needs_transform_update(hand));

    // Shoulder swings the arm to +y, elbow then folds it up along +z.
    let tip = tree.world_transform(hand).unwrap().translation.vector;
    assert_relative_eq!(tip, Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-12);
    assert!(!tree.needs_transform_update(hand));
}

#[test]
fn joint_frames_carry_coordinates_down_the_chain() {
    let mut tree = FrameTree::new();
    let shoulder = tree
        .add_joint_frame(
            FrameId::WORLD,
            "shoulder",
            Box::new(BallJoint::new(
                JointProperties::new("shoulder")
                    .with_parent_to_joint(Isometry3::translation(0.0, 0.0, 1.0)),
            )),
        )
        .unwrap();
    let elbow = tree
        .add_joint_frame(
            shoulder,
            "elbow",
            Box::new(BallJoint::new(
                JointProperties::new("elbow")
                    .with_child_to_joint(Isometry3::translation(-1.0, 0.0, 0.0)),
            )),
        )
        .unwrap();
    let hand = tree
        .add_entity(elbow, "hand", EntityOptions::default())
        .unwrap();

    assert_relative_eq!(
        tree.world_transform(hand).unwrap().translation.vector,
        Vector3::new(1.0, 0.0, 1.0),
        epsilon = 1e-12
    );

    let moved = Rc::new(Cell::new(0));
    let sink = Rc::clone(&moved);
    tree.signals(hand)
        .unwrap()
        .on_transform_updated()
        .connect(move |_| sink.set(sink.get() + 1));

    tree.set_joint_positions(shoulder, &DVector::from_vec(vec![0.0, 0.0, FRAC_PI_2]))
        .unwrap();
    tree.set_joint_positions(elbow, &DVector::from_vec(vec![0.0, -FRAC_PI_2, 0.0]))
        .unwrap();
    assert_eq!(moved.get(), 2);

    let tip = tree.world_transform(hand).unwrap().translation.vector;
    assert_relative_eq!(tip, Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-12);

    // The hand's spatial velocity matches a small step of the elbow.
    tree.set_joint_velocities(elbow, &DVector::from_vec(vec![0.3, 0.0, 1.0]))
        .unwrap();
    assert!(!tree.needs_transform_update(hand));
    let tf = tree.world_transform(hand).unwrap();
    let v = tree.spatial_velocity(hand).unwrap();
    let linear = tf.rotation * Vector3::new(v[3], v[4], v[5]);

    let dt = 1e-7;
    tree.integrate_joint_positions(elbow, dt).unwrap();
    let stepped = tree.world_transform(hand).unwrap();
    let moved_by = (stepped.translation.vector - tf.translation.vector) / dt;
    assert!(linear.norm() > 0.1);
    assert_relative_eq!(moved_by, linear, epsilon = 1e-5);
}

#[test]
fn removing_a_branch_reattaches_to_world() {
    let mut tree = FrameTree::new();
    let base = tree
        .add_frame(FrameId::WORLD, "base", Isometry3::translation(3.0, 0.0, 0.0))
        .unwrap();
    let link = tree
        .add_frame(base, "link", Isometry3::translation(0.0, 2.0, 0.0))
        .unwrap();

    let moves = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&moves);
    tree.signals(link.entity())
        .unwrap()
        .on_frame_changed()
        .connect(move |ev| sink.borrow_mut().push(*ev));

    tree.remove(base.entity()).unwrap();

    assert_eq!(
        *moves.borrow(),
        vec![FrameChanged {
            entity: link.entity(),
            old_parent: Some(base),
            new_parent: Some(FrameId::WORLD),
        }]
    );
    assert_relative_eq!(
        tree.world_transform(link.entity()).unwrap().translation.vector,
        Vector3::new(0.0, 2.0, 0.0),
        epsilon = 1e-12
    );
    assert_eq!(
        tree.set_parent_frame(link.entity(), base),
        Err(KinematicsError::UnknownEntity(base.entity()))
    );
}

#[test]
fn child_hooks_report_membership_changes() {
    let mut tree = FrameTree::new();
    let a = tree
        .add_frame(FrameId::WORLD, "a", Isometry3::identity())
        .unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    let added = Rc::clone(&log);
    tree.frame_signals(a)
        .unwrap()
        .on_child_added()
        .connect(move |ev: &ChildChanged| added.borrow_mut().push(("added", ev.child)));
    let removed = Rc::clone(&log);
    tree.frame_signals(a)
        .unwrap()
        .on_child_removed()
        .connect(move |ev: &ChildChanged| removed.borrow_mut().push(("removed", ev.child)));

    let e = tree.add_entity(a, "e", EntityOptions::default()).unwrap();
    tree.set_parent_frame(e, FrameId::WORLD).unwrap();

    assert_eq!(*log.borrow(), vec![("added", e), ("removed", e)]);
}

// =============================================================================
// Signals
// =============================================================================

#[test]
fn slot_can_cancel_another_mid_round() {
    let signal: Signal<u32> = Signal::new();
    let victim_calls = Rc::new(Cell::new(0));
    let victim_conn: Rc<RefCell<Connection>> = Rc::new(RefCell::new(Connection::default()));

    let target = Rc::clone(&victim_conn);
    signal.connect(move |_| target.borrow().disconnect());

    let calls = Rc::clone(&victim_calls);
    *victim_conn.borrow_mut() = signal.connect(move |_| calls.set(calls.get() + 1));

    signal.raise(&1);
    signal.raise(&2);

    assert_eq!(victim_calls.get(), 0);
    assert!(!victim_conn.borrow().connected());
    assert_eq!(signal.num_slots(), 1);
}

// =============================================================================
// Heterogeneous joints
// =============================================================================

#[test]
fn boxed_joints_integrate_together() {
    let mut joints: Vec<Box<dyn Joint>> = vec![
        Box::new(BallJoint::new(JointProperties::new("hip"))),
        Box::new(FreeJoint::new(JointProperties::new("root"))),
    ];

    for joint in &mut joints {
        let n = joint.num_dofs();
        joint
            .set_velocities(&nalgebra::DVector::from_element(n, 0.1))
            .unwrap();
        joint.integrate_positions(0.5).unwrap();
    }

    for joint in &joints {
        assert!(joint.positions().iter().all(|q| (q - 0.05).abs() < 1e-3));
        assert!(joint.local_jacobian().iter().all(|x| x.is_finite()));
    }
    assert_eq!(joints[1].dof_name(5), Some("root_pos_z"));
}
