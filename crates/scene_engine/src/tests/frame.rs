use super::*;
use crate::foundation::math::utils::translation_of;
use crate::foundation::math::{Mat4, Vec3};
use crate::render::backend::{BackendError, ObjectKind};
use crate::render::material::{MaterialFlags, MaterialType};
use crate::render::recording::BackendCall;
use crate::scene::{EmptyNode, MeshNode};

#[test]
fn test_hidden_node_and_descendants_never_register() {
    let mut harness = Harness::new();
    let j = harness.journal.clone();
    let a = harness.probe(None, "a");
    harness.probe(Some(a), "b");
    harness.graph.set_visible(a, false);

    let report = harness.frame(0);
    assert_eq!(report.registered, 0);
    assert!(entries_with_prefix(&j, "register:").is_empty());
    assert!(entries_with_prefix(&j, "render:").is_empty());

    harness.graph.set_visible(a, true);
    let report = harness.frame(16);
    assert_eq!(report.registered, 2);
    assert_eq!(entries_with_prefix(&j, "register:"), ["a", "b"]);
}

#[test]
fn test_registration_is_rebuilt_every_frame() {
    let mut harness = Harness::new();
    let a = harness.probe(None, "a");
    harness.probe(None, "b");

    assert_eq!(harness.frame(0).registered, 2);
    harness.graph.set_visible(a, false);
    let report = harness.frame(16);
    assert_eq!(report.registered, 1);
    assert_eq!(report.rendered, 1);
    assert_eq!(harness.graph.manager(harness.manager).unwrap().render_queue().len(), 1);
}

#[test]
fn test_phases_complete_in_order() {
    let mut harness = Harness::new();
    let j = harness.journal.clone();
    let a = harness.probe(None, "a");
    let b = harness.probe(Some(a), "b");
    harness.graph.add_animator(a, JournalAnimator::handle("a", &j, Action::Record));
    harness.graph.add_animator(b, JournalAnimator::handle("b", &j, Action::Record));

    harness.frame(0);
    assert_eq!(
        entries(&j),
        ["animate:a", "animate:b", "register:a", "register:b", "render:a", "render:b"]
    );
}

#[test]
fn test_passes_render_in_fixed_order() {
    let mut harness = Harness::new();
    let j = harness.journal.clone();
    for (label, pass) in [
        ("transparent", RenderPass::Transparent),
        ("solid", RenderPass::Solid),
        ("sky", RenderPass::SkyBox),
        ("light", RenderPass::Light),
        ("camera", RenderPass::Camera),
    ] {
        let kind = ProbeNode::new(label, &j).in_pass(pass);
        harness.add(None, kind, NodeDesc::new());
    }

    harness.frame(0);
    assert_eq!(
        entries_with_prefix(&j, "render:"),
        ["camera", "light", "sky", "solid", "transparent"]
    );
}

#[test]
fn test_solid_nodes_render_by_priority() {
    let mut harness = Harness::new();
    let j = harness.journal.clone();
    for (label, priority) in [("late", 30), ("early", 10), ("middle", 20), ("tie", 20)] {
        let kind = ProbeNode::new(label, &j);
        harness.add(None, kind, NodeDesc::new().with_render_priority(priority));
    }

    harness.frame(0);
    assert_eq!(entries_with_prefix(&j, "render:"), ["early", "middle", "tie", "late"]);
}

#[test]
fn test_transparent_nodes_render_back_to_front() {
    let mut harness = Harness::new();
    let j = harness.journal.clone();
    for (label, z) in [("near", 1.0), ("far", 10.0), ("mid", 5.0)] {
        let kind = ProbeNode::new(label, &j).in_pass(RenderPass::Transparent);
        harness.add(None, kind, NodeDesc::new().with_position(Vec3::new(0.0, 0.0, z)));
    }
    harness.graph.set_camera_position(harness.manager, Some(Vec3::zeros()));

    harness.frame(0);
    assert_eq!(entries_with_prefix(&j, "render:"), ["far", "mid", "near"]);
}

#[test]
fn test_transparent_nodes_without_camera_use_priority() {
    let mut harness = Harness::new();
    let j = harness.journal.clone();
    for (label, z, priority) in [("near", 1.0, 2), ("far", 10.0, 1)] {
        let kind = ProbeNode::new(label, &j).in_pass(RenderPass::Transparent);
        let desc = NodeDesc::new()
            .with_position(Vec3::new(0.0, 0.0, z))
            .with_render_priority(priority);
        harness.add(None, kind, desc);
    }

    harness.frame(0);
    assert_eq!(entries_with_prefix(&j, "render:"), ["far", "near"]);
}

#[test]
fn test_failed_node_does_not_abort_the_frame() {
    let mut harness = Harness::new();
    let j = harness.journal.clone();
    let plain = harness.triangle();
    let colored = harness.colored_triangle();
    harness.add(None, ProbeNode::new("first", &j).drawing(plain.clone()), NodeDesc::new());
    let failing = harness.add(None, ProbeNode::new("second", &j).drawing(colored), NodeDesc::new());
    harness.add(None, ProbeNode::new("third", &j).drawing(plain), NodeDesc::new());
    harness.backend.set_object_budget(ObjectKind::VertexArray, 1);

    let report = harness.frame(0);
    assert_eq!(report.registered, 3);
    assert_eq!(report.rendered, 2);
    assert_eq!(
        report.failed,
        vec![(
            failing,
            DriverError::Backend(BackendError::OutOfResources(ObjectKind::VertexArray))
        )]
    );
    assert_eq!(entries_with_prefix(&j, "render:"), ["first", "second", "third"]);
    assert_eq!(harness.driver.stats().draw_calls, 2);

    harness.backend.set_object_budget(ObjectKind::VertexArray, 4);
    let report = harness.frame(16);
    assert_eq!(report.rendered, 3);
    assert!(report.failed.is_empty());
}

#[test]
fn test_mesh_node_registers_by_material_transparency() {
    let mut harness = Harness::new();
    let solid = MeshNode::new(vec![harness.triangle()]);
    let glass = MeshNode::new(vec![harness.triangle()])
        .with_material(0, Material::with_type(MaterialType::TransparentAlphaChannel));
    harness.add(None, solid, NodeDesc::new());
    harness.add(None, glass, NodeDesc::new());
    harness.add(None, EmptyNode::new(), NodeDesc::new());

    let report = harness.frame(0);
    assert_eq!(report.registered, 2);
    assert_eq!(report.rendered, 2);
    let queue = harness.graph.manager(harness.manager).unwrap().render_queue();
    assert_eq!(queue.pass(RenderPass::Solid).len(), 1);
    assert_eq!(queue.pass(RenderPass::Transparent).len(), 1);
    assert_eq!(
        harness.backend.count_calls(|call| matches!(call, BackendCall::Draw { .. })),
        2
    );
}

fn world_transforms(harness: &Harness) -> Vec<Mat4> {
    harness
        .backend
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            BackendCall::WorldTransform(matrix) => Some(matrix),
            _ => None,
        })
        .collect()
}

#[test]
fn test_mesh_draws_with_its_world_matrix() {
    let mut harness = Harness::new();
    let pivot = harness.probe(None, "pivot");
    let mesh = MeshNode::new(vec![harness.triangle()]);
    let node = harness.add(Some(pivot), mesh, NodeDesc::new());
    harness.graph.set_position(node, Vec3::new(1.0, 0.0, 0.0));

    harness.frame(0);
    let sent = world_transforms(&harness);
    assert_eq!(sent.len(), 1);
    assert_eq!(translation_of(&sent[0]), Vec3::new(1.0, 0.0, 0.0));

    harness.graph.set_position(pivot, Vec3::new(10.0, 0.0, 0.0));
    harness.backend.clear_calls();
    harness.frame(16);
    let calls = harness.backend.calls();
    let matrix_at = calls
        .iter()
        .position(|call| matches!(call, BackendCall::WorldTransform(_)))
        .unwrap();
    let draw_at = calls
        .iter()
        .position(|call| matches!(call, BackendCall::Draw { .. }))
        .unwrap();
    assert!(matrix_at < draw_at);
    assert_eq!(translation_of(&world_transforms(&harness)[0]), Vec3::new(11.0, 0.0, 0.0));

    // Unchanged matrix is not resent
    harness.backend.clear_calls();
    harness.frame(32);
    assert!(world_transforms(&harness).is_empty());
    assert_eq!(
        harness.backend.count_calls(|call| matches!(call, BackendCall::Draw { .. })),
        1
    );
}

#[test]
fn test_material_setters_apply_to_every_slot() {
    let mut harness = Harness::new();
    let mesh = MeshNode::new(vec![harness.triangle(), harness.colored_triangle()]);
    let node = harness.add(None, mesh, NodeDesc::new());
    let texture = harness
        .driver
        .create_texture(crate::render::backend::TextureDescriptor::new("detail", 4, 4))
        .unwrap();

    assert_eq!(harness.graph.material_count(node), 2);
    assert_eq!(harness.graph.set_material_flag(node, MaterialFlags::WIREFRAME, true), 2);
    assert_eq!(harness.graph.set_material_type(node, MaterialType::TransparentAddColor), 2);
    assert_eq!(harness.graph.set_material_texture(node, 1, Some(&texture)), 2);
    assert_eq!(harness.graph.set_material_texture(node, 99, Some(&texture)), 0);

    for index in 0..2 {
        let material = harness.graph.material(node, index).unwrap();
        assert!(material.flag(MaterialFlags::WIREFRAME));
        assert!(material.is_transparent());
        assert!(material.texture(1).is_some());
    }
    assert!(harness.graph.material(node, 2).is_none());

    let empty = harness.add(None, EmptyNode::new(), NodeDesc::new());
    assert_eq!(harness.graph.set_material_flag(empty, MaterialFlags::WIREFRAME, true), 0);
}

#[test]
fn test_draw_all_on_unknown_manager() {
    let mut harness = Harness::new();
    let other = harness.graph.create_manager("other");
    harness.graph.remove_manager(other);
    let result = harness.graph.draw_all(other, 0, &harness.driver);
    assert_eq!(result, Err(crate::scene::SceneError::ManagerNotFound(other)));
}
