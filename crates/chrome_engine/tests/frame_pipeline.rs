//! End-to-end frame pipeline tests against the headless backend

mod common;

use ash::vk;
use chrome_engine::render::headless::{HeadlessDevice, RecordedCommand};
use chrome_engine::render::threading::ObjectId;
use chrome_engine::render::vulkan::VulkanError;
use chrome_engine::render::{FenceStatus, FrameState, RenderError, SwapchainStatus};

use common::{config, mesh, Rig};

/// Objects pushed out of view in the four-by-eight scenario
const CULLED: [(usize, usize); 10] = [
    (0, 0), (0, 1), (0, 2), (0, 3),
    (2, 1), (2, 3), (2, 5),
    (3, 0), (3, 6), (3, 7),
];

fn push_out_of_view(rig: &Rig, objects: &[(usize, usize)]) {
    let arena = rig.assembler.arena().unwrap();
    for &(thread, slot) in objects {
        let moved = arena
            .with_object_mut(ObjectId::new(thread, slot), |object| object.position.x = 1000.0)
            .unwrap();
        assert!(moved.is_some());
    }
}

fn buffers_for(rig: &Rig, ids: &[ObjectId]) -> Vec<vk::CommandBuffer> {
    let arena = rig.assembler.arena().unwrap();
    ids.iter()
        .map(|id| arena.lock(id.thread).unwrap().command_buffer(id.slot).unwrap())
        .collect()
}

#[test]
fn test_four_threads_eight_objects_ten_culled() {
    let mut rig = Rig::new(config(vec![8; 4]), Some(mesh()));
    rig.assembler.prepare().unwrap();
    push_out_of_view(&rig, &CULLED);

    let report = rig.assembler.render_frame(0.016).unwrap();

    assert_eq!(report.dispatched_jobs, 32);
    assert_eq!(report.visible, 22);
    assert_eq!(report.culled, 10);

    let expected: Vec<ObjectId> = (0..4)
        .flat_map(|thread| (0..8).map(move |slot| (thread, slot)))
        .filter(|pair| !CULLED.contains(pair))
        .map(|(thread, slot)| ObjectId::new(thread, slot))
        .collect();
    let visible = rig.assembler.visible_set();
    assert_eq!(visible, expected);

    let primary = rig.assembler.primary_buffer().unwrap();
    assert_eq!(
        rig.device.executed_batches(primary),
        vec![buffers_for(&rig, &expected)]
    );
}

#[test]
fn test_culled_objects_record_nothing() {
    let mut rig = Rig::new(config(vec![8; 4]), Some(mesh()));
    rig.assembler.prepare().unwrap();
    push_out_of_view(&rig, &CULLED);
    rig.assembler.render_frame(0.0).unwrap();

    let culled: Vec<ObjectId> = CULLED.iter().map(|&(t, s)| ObjectId::new(t, s)).collect();
    for buffer in buffers_for(&rig, &culled) {
        assert!(rig.device.commands(buffer).is_empty());
    }

    let arena = rig.assembler.arena().unwrap();
    assert!(!arena.lock(0).unwrap().objects()[0].visible);
    assert!(arena.lock(0).unwrap().objects()[4].visible);
}

#[test]
fn test_visible_secondary_trace() {
    let mut rig = Rig::new(config(vec![1]), Some(mesh()));
    rig.assembler.prepare().unwrap();
    rig.assembler.render_frame(0.0).unwrap();

    let buffer = buffers_for(&rig, &[ObjectId::new(0, 0)])[0];
    let trace = rig.device.commands(buffer);

    assert!(matches!(trace.first(), Some(RecordedCommand::BeginSecondary(info)) if info.subpass == 0));
    assert!(trace.contains(&RecordedCommand::SetViewport { width: 64.0, height: 64.0 }));
    assert!(trace.contains(&RecordedCommand::BindVertexBuffer(mesh().vertex_buffer)));
    assert!(trace.contains(&RecordedCommand::BindIndexBuffer(mesh().index_buffer)));
    assert!(trace.contains(&RecordedCommand::DrawIndexed {
        index_count: 36,
        first_index: 0,
    }));
    assert!(trace.iter().any(|c| matches!(
        c,
        RecordedCommand::PushConstants { stages, data, .. }
            if *stages == vk::ShaderStageFlags::VERTEX && data.len() == 76
    )));
    assert_eq!(trace.last(), Some(&RecordedCommand::End));
}

#[test]
fn test_fence_timeouts_are_retried() {
    let mut rig = Rig::new(config(vec![2, 2]), Some(mesh()));
    rig.assembler.prepare().unwrap();
    rig.device
        .script_fence_results([FenceStatus::Timeout, FenceStatus::Timeout, FenceStatus::Timeout]);

    let report = rig.assembler.render_frame(0.0).unwrap();

    assert_eq!(report.fence_retries, 3);
    assert_eq!(rig.device.fence_waits(), 4);
    assert_eq!(rig.device.fence_resets(), 1);
    assert_eq!(rig.swapchain.presented().len(), 1);
}

#[test]
fn test_device_lost_is_fatal() {
    let mut rig = Rig::new(config(vec![2, 2]), Some(mesh()));
    rig.assembler.prepare().unwrap();
    rig.device
        .script_fence_results([FenceStatus::Failed(vk::Result::ERROR_DEVICE_LOST)]);

    let err = rig.assembler.render_frame(0.0).unwrap_err();

    assert!(matches!(err, RenderError::DeviceLost { .. }));
    assert!(!err.is_recoverable());
    assert_eq!(rig.device.fence_resets(), 0);
    assert!(rig.swapchain.presented().is_empty());
}

#[test]
fn test_accumulated_timeouts_past_threshold_are_device_lost() {
    let mut config = config(vec![1]);
    config.renderer.fence_timeout_ns = 100;
    config.renderer.device_lost_threshold_ns = 250;
    let mut rig = Rig::new(config, Some(mesh()));
    rig.assembler.prepare().unwrap();
    rig.device.script_fence_results([FenceStatus::Timeout; 3]);

    assert_eq!(
        rig.assembler.render_frame(0.0),
        Err(RenderError::DeviceLost { waited_ns: 300 })
    );
}

#[test]
fn test_other_fence_failures_are_fatal() {
    let mut rig = Rig::new(config(vec![1]), Some(mesh()));
    rig.assembler.prepare().unwrap();
    rig.device
        .script_fence_results([FenceStatus::Failed(vk::Result::ERROR_OUT_OF_HOST_MEMORY)]);

    assert_eq!(
        rig.assembler.render_frame(0.0),
        Err(RenderError::FenceWaitFailed(vk::Result::ERROR_OUT_OF_HOST_MEMORY))
    );
}

#[test]
fn test_thread_without_objects_does_not_stall() {
    let mut rig = Rig::new(config(vec![3, 0, 2]), Some(mesh()));
    rig.assembler.prepare().unwrap();

    let report = rig.assembler.render_frame(0.0).unwrap();

    assert_eq!(report.dispatched_jobs, 5);
    assert_eq!(report.visible, 5);
    assert_eq!(rig.assembler.arena().unwrap().object_count(1), Ok(0));
    assert!(rig
        .assembler
        .visible_set()
        .iter()
        .all(|id| id.thread != 1));
}

#[test]
fn test_assembly_order_survives_jitter() {
    let expected: Vec<ObjectId> = (0..4)
        .flat_map(|thread| (0..6).map(move |slot| ObjectId::new(thread, slot)))
        .collect();

    for seed in [1, 2, 3] {
        let mut rig = Rig::with_device(config(vec![6; 4]), Some(mesh()), HeadlessDevice::with_jitter(seed, 300));
        rig.assembler.prepare().unwrap();

        for _ in 0..3 {
            rig.assembler.render_frame(0.016).unwrap();
            assert_eq!(rig.assembler.visible_set(), expected);

            let primary = rig.assembler.primary_buffer().unwrap();
            assert_eq!(
                rig.device.executed_batches(primary),
                vec![buffers_for(&rig, &expected)]
            );
        }
    }
}

#[test]
fn test_nothing_visible_skips_execute() {
    let mut rig = Rig::new(config(vec![4, 4]), None);
    rig.assembler.prepare().unwrap();

    let report = rig.assembler.render_frame(0.0).unwrap();
    assert_eq!(report.dispatched_jobs, 8);
    assert_eq!(report.visible, 0);

    let primary = rig.assembler.primary_buffer().unwrap();
    let trace = rig.device.commands(primary);
    assert!(rig.device.executed_batches(primary).is_empty());
    assert!(trace.iter().any(|c| matches!(c, RecordedCommand::BeginRenderPass { .. })));
    assert!(trace.contains(&RecordedCommand::EndRenderPass));
    assert_eq!(rig.device.submissions().len(), 1);
}

#[test]
fn test_primary_render_pass_clears_and_covers_extent() {
    let mut rig = Rig::new(config(vec![1]), Some(mesh()));
    rig.assembler.prepare().unwrap();
    rig.assembler.render_frame(0.0).unwrap();

    let primary = rig.assembler.primary_buffer().unwrap();
    let begin = rig
        .device
        .commands(primary)
        .into_iter()
        .find_map(|c| match c {
            RecordedCommand::BeginRenderPass { render_area, clear_value_count, .. } => {
                Some((render_area, clear_value_count))
            }
            _ => None,
        })
        .unwrap();

    assert_eq!(begin.0.extent, common::EXTENT);
    assert_eq!(begin.1, 3);
}

#[test]
fn test_one_frame_in_flight_across_frames() {
    let mut rig = Rig::new(config(vec![4; 3]), Some(mesh()));
    rig.assembler.prepare().unwrap();
    rig.device.script_fence_results([FenceStatus::Timeout]);

    for _ in 0..5 {
        rig.assembler.render_frame(0.016).unwrap();
    }

    assert_eq!(rig.device.protocol_violations(), 0);
    assert_eq!(rig.device.submissions().len(), 5);
    assert_eq!(rig.device.fence_resets(), 5);
    assert_eq!(rig.assembler.stats().frames, 5);
    assert_eq!(rig.assembler.last_report().map(|r| r.frame_index), Some(4));
    assert_eq!(rig.swapchain.presented(), vec![0, 1, 2, 0, 1]);
}

#[test]
fn test_recording_failure_fails_the_frame() {
    let mut rig = Rig::new(config(vec![2, 2]), Some(mesh()));
    rig.assembler.prepare().unwrap();
    rig.device.fail_next_begin(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);

    let err = rig.assembler.render_frame(0.0).unwrap_err();

    assert!(matches!(
        err,
        RenderError::RecordingFailed {
            source: VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            ..
        }
    ));
    assert!(rig.device.submissions().is_empty());
    assert_eq!(rig.assembler.state(), FrameState::Dispatched);
}

#[test]
fn test_out_of_date_present_is_recoverable() {
    let mut rig = Rig::new(config(vec![2]), Some(mesh()));
    rig.assembler.prepare().unwrap();
    rig.swapchain.script_present([SwapchainStatus::OutOfDate]);

    let err = rig.assembler.render_frame(0.0).unwrap_err();
    assert_eq!(err, RenderError::SwapchainRebuildRequired(SwapchainStatus::OutOfDate));
    assert!(err.is_recoverable());
    assert_eq!(rig.assembler.state(), FrameState::Idle);

    // The unpresented frame is not counted
    assert_eq!(rig.assembler.stats().frames, 0);
    assert_eq!(rig.assembler.last_report(), None);

    let report = rig.assembler.render_frame(0.0).unwrap();
    assert_eq!(report.frame_index, 0);
    assert_eq!(rig.assembler.stats().frames, 1);
    assert_eq!(rig.device.protocol_violations(), 0);
}

#[test]
fn test_out_of_date_acquire_skips_the_frame() {
    let mut rig = Rig::new(config(vec![2]), Some(mesh()));
    rig.assembler.prepare().unwrap();
    rig.swapchain.script_acquire([SwapchainStatus::OutOfDate]);

    assert_eq!(
        rig.assembler.render_frame(0.0),
        Err(RenderError::SwapchainRebuildRequired(SwapchainStatus::OutOfDate))
    );
    assert!(rig.device.submissions().is_empty());
    assert!(rig.swapchain.presented().is_empty());
}

#[test]
fn test_suboptimal_acquire_still_renders_and_presents() {
    let mut rig = Rig::new(config(vec![2]), Some(mesh()));
    rig.assembler.prepare().unwrap();
    rig.swapchain.script_acquire([SwapchainStatus::Suboptimal]);

    let report = rig.assembler.render_frame(0.0).unwrap();
    assert_eq!(report.frame_index, 0);
    assert_eq!(rig.assembler.image_index(), 0);
    assert_eq!(rig.device.submissions().len(), 1);
    assert_eq!(rig.swapchain.presented(), vec![0]);

    // Every acquired image gets presented
    rig.assembler.render_frame(0.0).unwrap();
    assert_eq!(rig.swapchain.presented(), vec![0, 1]);
    assert_eq!(rig.device.protocol_violations(), 0);
}

#[test]
fn test_suboptimal_present_requests_rebuild() {
    let mut rig = Rig::new(config(vec![2]), Some(mesh()));
    rig.assembler.prepare().unwrap();
    rig.swapchain.script_present([SwapchainStatus::Suboptimal]);

    assert_eq!(
        rig.assembler.render_frame(0.0),
        Err(RenderError::SwapchainRebuildRequired(SwapchainStatus::Suboptimal))
    );
    assert_eq!(rig.swapchain.presented(), vec![0]);
    assert_eq!(rig.assembler.stats().frames, 0);
}
