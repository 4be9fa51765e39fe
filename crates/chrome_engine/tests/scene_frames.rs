//! Scene pass recorded alongside the per-object buffers

mod common;

use ash::vk::{self, Handle};
use chrome_engine::render::headless::RecordedCommand;
use chrome_engine::render::scene::{PartSelection, ScenePass};

use common::{config, mesh, scene, scene_pipelines, Rig};

fn scene_rig(counts: Vec<usize>, with_mesh: bool) -> Rig {
    let pass = ScenePass::new(scene(), scene_pipelines());
    Rig::with_scene(config(counts), with_mesh.then(mesh), pass)
}

fn draws(trace: &[RecordedCommand]) -> Vec<(u64, u32)> {
    let mut pipeline = vk::Pipeline::null();
    let mut out = Vec::new();
    for command in trace {
        match command {
            RecordedCommand::BindPipeline(p) => pipeline = *p,
            RecordedCommand::DrawIndexed { first_index, .. } => out.push((pipeline.as_raw(), *first_index)),
            _ => {}
        }
    }
    out
}

#[test]
fn test_scene_executes_ahead_of_objects() {
    let mut rig = scene_rig(vec![2, 2], true);
    rig.assembler.prepare().unwrap();

    let report = rig.assembler.render_frame(0.016).unwrap();
    assert_eq!(report.scene_draws, 4);
    assert_eq!(report.visible, 4);

    let scene_buffer = rig.assembler.scene_buffer().unwrap();
    let primary = rig.assembler.primary_buffer().unwrap();
    let batches = rig.device.executed_batches(primary);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 5);
    assert_eq!(batches[0][0], scene_buffer);
}

#[test]
fn test_scene_trace_orders_buckets() {
    let mut rig = scene_rig(vec![1], true);
    rig.assembler.prepare().unwrap();
    rig.assembler.render_frame(0.0).unwrap();

    let trace = rig.device.commands(rig.assembler.scene_buffer().unwrap());
    assert!(matches!(trace.first(), Some(RecordedCommand::BeginSecondary(info)) if info.subpass == 0));
    assert!(trace.contains(&RecordedCommand::SetViewport { width: 64.0, height: 64.0 }));
    assert!(trace.contains(&RecordedCommand::BindVertexBuffer(vk::Buffer::from_raw(0xF0))));
    assert_eq!(trace.last(), Some(&RecordedCommand::End));

    // Mask, then opaque in part order, then blended. A leading tag does not count.
    assert_eq!(draws(&trace), vec![(0xE0, 24), (0xE1, 0), (0xE1, 36), (0xE2, 12)]);
}

#[test]
fn test_scene_drawn_when_no_object_is_visible() {
    let mut rig = scene_rig(vec![3], false);
    rig.assembler.prepare().unwrap();

    let report = rig.assembler.render_frame(0.0).unwrap();
    assert_eq!(report.visible, 0);
    assert_eq!(report.scene_draws, 4);

    let primary = rig.assembler.primary_buffer().unwrap();
    assert_eq!(
        rig.device.executed_batches(primary),
        vec![vec![rig.assembler.scene_buffer().unwrap()]]
    );
}

#[test]
fn test_selection_changes_between_frames() {
    let mut rig = scene_rig(vec![1], true);
    rig.assembler.prepare().unwrap();
    rig.assembler.render_frame(0.0).unwrap();

    rig.assembler
        .scene_pass_mut()
        .unwrap()
        .set_selection(PartSelection::Single(3));
    let report = rig.assembler.render_frame(0.0).unwrap();

    assert_eq!(report.scene_draws, 1);
    let trace = rig.device.commands(rig.assembler.scene_buffer().unwrap());
    assert_eq!(draws(&trace), vec![(0xE1, 36)]);
    assert_eq!(rig.assembler.stats().frames, 2);
}

#[test]
fn test_empty_selection_leaves_scene_out() {
    let mut rig = scene_rig(vec![2], true);
    rig.assembler
        .scene_pass_mut()
        .unwrap()
        .set_selection(PartSelection::Single(9));
    rig.assembler.prepare().unwrap();

    let report = rig.assembler.render_frame(0.0).unwrap();
    assert_eq!(report.scene_draws, 0);

    let primary = rig.assembler.primary_buffer().unwrap();
    let batches = rig.device.executed_batches(primary);
    assert_eq!(batches.len(), 1);
    assert!(!batches[0].contains(&rig.assembler.scene_buffer().unwrap()));
}

#[test]
fn test_scene_buffer_released_with_the_frame_resources() {
    let mut rig = scene_rig(vec![1, 1], true);
    assert_eq!(rig.assembler.scene_buffer(), None);
    rig.assembler.prepare().unwrap();
    assert!(rig.assembler.scene_buffer().is_some());

    rig.assembler.render_frame(0.0).unwrap();
    rig.assembler.release();

    assert_eq!(rig.assembler.scene_buffer(), None);
    assert_eq!(rig.device.live_pools(), 0);
}
