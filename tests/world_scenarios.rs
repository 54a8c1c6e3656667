use glam::DVec3;
use petalsonic_acoustics::{
    AcousticWorld, AcousticWorldDesc, BoundingBox, DiffuseSource, Mask, Obstacle, PointSource,
    Polygon, Receiver, ReceiverId, Reflector, SceneCommand, Shoebox, SourceId, ZyxEuler,
};
use std::f64::consts::PI;

// 100 samples per meter
const FS: u32 = 34000;
const C: f64 = 340.0;
const BLOCK: usize = 256;

fn desc(order: u32) -> AcousticWorldDesc {
    let _ = env_logger::builder().is_test(true).try_init();
    AcousticWorldDesc::new()
        .sample_rate(FS)
        .speed_of_sound(C)
        .block_size(BLOCK)
        .mirror_order(order)
}

/// 2 x 2 m wall in the plane x = `x`, centered on the x axis, facing -x.
fn wall(x: f64) -> Reflector {
    let mut face = Polygon::rectangle(2.0, 2.0).unwrap();
    face.apply_rot_loc(DVec3::new(x, 1.0, -1.0), ZyxEuler::new(PI, 0.0, 0.0));
    Reflector::new(face)
}

fn screen(x: f64) -> Obstacle {
    let mut face = Polygon::rectangle(2.0, 2.0).unwrap();
    face.apply_rot_loc(DVec3::new(x, 1.0, -1.0), ZyxEuler::new(PI, 0.0, 0.0));
    Obstacle::new(face)
}

fn source(p: DVec3) -> PointSource {
    PointSource::new(p).with_max_distance(20.0)
}

/// Renders `blocks` blocks with an impulse at the start of the first one and
/// returns the first channel of `rec`.
fn impulse_response(
    world: &mut AcousticWorld,
    src: SourceId,
    rec: ReceiverId,
    blocks: usize,
) -> Vec<f32> {
    let mut out = Vec::with_capacity(blocks * BLOCK);
    for b in 0..blocks {
        let audio = world.source_audio_mut(src).unwrap();
        audio.fill(0.0);
        if b == 0 {
            audio[0] = 1.0;
        }
        world.process();
        out.extend_from_slice(&world.receiver_output(rec).unwrap()[0]);
    }
    out
}

fn peak(signal: &[f32]) -> (usize, f32) {
    signal
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .unwrap()
}

#[test]
fn test_first_order_reflection_arrives_after_direct_path() {
    let mut world = AcousticWorld::new(desc(1)).unwrap();
    let src = world.add_source(source(DVec3::new(2.0, 0.0, 0.0))).unwrap();
    world.add_reflector(wall(4.0)).unwrap();
    let rec = world.add_receiver(Receiver::omni()).unwrap();

    let out = impulse_response(&mut world, src, rec, 3);
    assert_eq!(world.image_sources(), 1);
    assert_eq!(world.total_point_sources(), 2);
    let image = world.mirror_model().images()[0].position();
    assert!((image - DVec3::new(6.0, 0.0, 0.0)).length() < 1e-9);

    // direct path: 2 m
    assert_eq!(peak(&out[..400]).0, 200);
    let direct = out[200];
    assert!(direct > 0.45 && direct <= 0.5);
    // reflection: 6 m, nothing from it before
    assert!(out[599].abs() < 1e-6);
    let reflected = out[600];
    assert!(reflected > 0.13 && reflected <= 1.0 / 6.0);
    assert_eq!(peak(&out[400..]).0 + 400, 600);
}

#[test]
fn test_order_zero_renders_direct_paths_only() {
    let mut world = AcousticWorld::new(desc(0)).unwrap();
    let src = world.add_source(source(DVec3::new(2.0, 0.0, 0.0))).unwrap();
    world.add_reflector(wall(4.0)).unwrap();
    let rec = world.add_receiver(Receiver::omni()).unwrap();

    let out = impulse_response(&mut world, src, rec, 3);
    assert_eq!(world.image_sources(), 0);
    assert_eq!(world.total_point_sources(), 1);
    assert!(out[600].abs() < 1e-6);
}

#[test]
fn test_source_behind_reflector_has_no_image() {
    let mut world = AcousticWorld::new(desc(1)).unwrap();
    world.add_source(source(DVec3::new(5.0, 0.0, 0.0))).unwrap();
    world.add_reflector(wall(4.0)).unwrap();
    world.add_receiver(Receiver::omni()).unwrap();
    world.process();
    assert_eq!(world.image_sources(), 0);
    assert_eq!(world.total_point_sources(), 1);
}

#[test]
fn test_inactive_reflector_drops_its_paths() {
    let mut world = AcousticWorld::new(desc(1)).unwrap();
    world.add_source(source(DVec3::new(2.0, 0.0, 0.0))).unwrap();
    let wall_id = world.add_reflector(wall(4.0)).unwrap();
    world.add_receiver(Receiver::omni()).unwrap();
    world.process();
    assert_eq!(world.total_point_sources(), 2);

    world.reflector_mut(wall_id).unwrap().active = false;
    world.process();
    assert_eq!(world.total_point_sources(), 1);
}

#[test]
fn test_gain_decreases_with_distance() {
    let mut near = AcousticWorld::new(desc(0)).unwrap();
    let a = near.add_source(source(DVec3::new(1.0, 0.0, 0.0))).unwrap();
    let ra = near.add_receiver(Receiver::omni()).unwrap();
    let mut far = AcousticWorld::new(desc(0)).unwrap();
    let b = far.add_source(source(DVec3::new(4.0, 0.0, 0.0))).unwrap();
    let rb = far.add_receiver(Receiver::omni()).unwrap();

    let near_out = impulse_response(&mut near, a, ra, 2);
    let far_out = impulse_response(&mut far, b, rb, 2);
    let (near_at, near_peak) = peak(&near_out);
    let (far_at, far_peak) = peak(&far_out);
    assert_eq!(near_at, 100);
    assert_eq!(far_at, 400);
    assert!(near_peak > 3.0 * far_peak);
}

#[test]
fn test_obstacle_darkens_shadowed_path() {
    let mut clear = AcousticWorld::new(desc(0)).unwrap();
    let a = clear.add_source(source(DVec3::new(2.0, 0.0, 0.0))).unwrap();
    let ra = clear.add_receiver(Receiver::omni()).unwrap();
    let mut shadowed = AcousticWorld::new(desc(0)).unwrap();
    let b = shadowed.add_source(source(DVec3::new(2.0, 0.0, 0.0))).unwrap();
    shadowed.add_obstacle(screen(1.0)).unwrap();
    let rb = shadowed.add_receiver(Receiver::omni()).unwrap();

    let energy = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>();
    let clear_out = impulse_response(&mut clear, a, ra, 2);
    let shadowed_out = impulse_response(&mut shadowed, b, rb, 2);
    assert!(energy(&shadowed_out) > 0.0);
    assert!(energy(&shadowed_out) < energy(&clear_out));
}

#[test]
fn test_hard_bounding_box_silences_outside_sources() {
    let mut world = AcousticWorld::new(desc(0)).unwrap();
    let src = world.add_source(source(DVec3::new(2.0, 0.0, 0.0))).unwrap();
    let region = Shoebox::new(DVec3::new(10.0, 0.0, 0.0), DVec3::splat(1.0), ZyxEuler::IDENTITY);
    let rec = world
        .add_receiver(Receiver::omni().with_bounding_box(BoundingBox::new(region, 0.0)))
        .unwrap();
    let out = impulse_response(&mut world, src, rec, 2);
    assert!(out.iter().all(|x| *x == 0.0));
    assert_eq!(world.active_point_sources(), 0);
}

#[test]
fn test_identical_worlds_render_identical_output() {
    let build = || {
        let mut world = AcousticWorld::new(desc(2)).unwrap();
        let s1 = world.add_source(source(DVec3::new(2.0, 0.3, 0.1))).unwrap();
        let s2 = world.add_source(source(DVec3::new(-1.0, 0.5, 0.0))).unwrap();
        world.add_reflector(wall(4.0)).unwrap();
        let mut back = Polygon::rectangle(2.0, 2.0).unwrap();
        back.apply_rot_loc(DVec3::new(-3.0, -1.0, -1.0), ZyxEuler::IDENTITY);
        world.add_reflector(Reflector::new(back)).unwrap();
        let rec = world.add_receiver(Receiver::ambisonic()).unwrap();
        (world, s1, s2, rec)
    };
    let (mut w1, a1, b1, r1) = build();
    let (mut w2, a2, b2, r2) = build();
    for block in 0..4 {
        for (world, a, b) in [(&mut w1, a1, b1), (&mut w2, a2, b2)] {
            for (k, v) in world.source_audio_mut(a).unwrap().iter_mut().enumerate() {
                *v = ((block * BLOCK + k) as f32 * 0.05).sin();
            }
            world.source_audio_mut(b).unwrap().fill(0.25);
            world.process();
        }
        assert_eq!(w1.receiver_output(r1), w2.receiver_output(r2));
    }
}

#[test]
fn test_receiver_gain_command_ramps_to_silence() {
    let mut world = AcousticWorld::new(desc(0).block_size(64)).unwrap();
    let src = world.add_source(source(DVec3::new(0.5, 0.0, 0.0))).unwrap();
    let rec = world.add_receiver(Receiver::omni()).unwrap();
    let control = world.command_sender();
    for _ in 0..20 {
        world.source_audio_mut(src).unwrap().fill(1.0);
        world.process();
    }
    assert!(world.receiver_output(rec).unwrap()[0][63] > 1.0);

    control.set_receiver_gain(rec, 0.0).unwrap();
    world.source_audio_mut(src).unwrap().fill(1.0);
    world.process();
    let ramp = world.receiver_output(rec).unwrap()[0].clone();
    assert!(ramp[0] > ramp[62]);
    assert_eq!(ramp[63], 0.0);

    world.source_audio_mut(src).unwrap().fill(1.0);
    world.process();
    assert!(world.receiver_output(rec).unwrap()[0].iter().all(|x| *x == 0.0));
}

#[test]
fn test_commands_wait_for_the_next_block() {
    let mut world = AcousticWorld::new(desc(0)).unwrap();
    let src = world.add_source(source(DVec3::new(2.0, 0.0, 0.0))).unwrap();
    world.add_receiver(Receiver::omni()).unwrap();
    let control = world.command_sender();
    control.send(SceneCommand::SetSourceActive(src, false)).unwrap();
    assert!(world.source(src).unwrap().active);
    world.process();
    assert!(!world.source(src).unwrap().active);
    assert_eq!(world.total_point_sources(), 0);
}

#[test]
fn test_door_is_heard_from_its_front_only() {
    let mut world = AcousticWorld::new(desc(0)).unwrap();
    let door = PointSource::door(DVec3::ZERO, 1.0, 1.0)
        .unwrap()
        .with_max_distance(20.0);
    let src = world.add_source(door).unwrap();
    let rec = world
        .add_receiver(Receiver::omni().at(DVec3::new(3.0, 0.5, 0.5)))
        .unwrap();

    let out = impulse_response(&mut world, src, rec, 2);
    assert_eq!(world.active_point_sources(), 1);
    // 3 m to the face, 1 m behind it
    assert_eq!(peak(&out).0, 400);

    world.receiver_mut(rec).unwrap().position = DVec3::new(-3.0, 0.5, 0.5);
    world.process();
    assert_eq!(world.active_point_sources(), 0);
}

#[test]
fn test_diffuse_field_inside_region() {
    let mut world = AcousticWorld::new(desc(0)).unwrap();
    let region = Shoebox::new(DVec3::ZERO, DVec3::splat(10.0), ZyxEuler::IDENTITY);
    let field = world.add_diffuse_source(DiffuseSource::new(region, 1.0)).unwrap();
    let rec = world.add_receiver(Receiver::omni()).unwrap();

    world.diffuse_audio_mut(field).unwrap().w.fill(0.25);
    world.process();
    assert_eq!(world.active_diffuse_sources(), 1);
    assert!(world.receiver_output(rec).unwrap()[0].iter().all(|x| *x == 0.25));

    assert_eq!(world.diffuse_source(field).unwrap().rms_level(), 0.25);

    // one block fading out, then silence
    world.receiver_mut(rec).unwrap().render_diffuse = false;
    world.process();
    assert_eq!(world.total_diffuse_sources(), 0);
    let fade = world.receiver_output(rec).unwrap()[0].clone();
    assert!(fade.windows(2).all(|w| w[1] <= w[0]));
    assert!(fade[0] > 0.24);
    assert_eq!(fade[BLOCK - 1], 0.0);

    world.process();
    assert!(world.diffuse_acoustic_models().is_empty());
    assert!(world.receiver_output(rec).unwrap()[0].iter().all(|x| *x == 0.0));
}

#[test]
fn test_ambisonic_receiver_encodes_direction() {
    let mut world = AcousticWorld::new(desc(0)).unwrap();
    let src = world.add_source(source(DVec3::new(0.0, 2.0, 0.0))).unwrap();
    let rec = world.add_receiver(Receiver::ambisonic()).unwrap();
    world.source_audio_mut(src).unwrap()[0] = 1.0;
    world.process();
    let out = world.receiver_output(rec).unwrap();
    assert_eq!(out.len(), 4);
    let (w, x, y) = (out[0][200], out[1][200], out[2][200]);
    assert!(w > 0.4);
    assert!((y - w).abs() < 1e-6);
    assert!(x.abs() < 1e-6);
}

#[test]
fn test_frozen_scene_reaches_bit_identical_blocks() {
    let mut world = AcousticWorld::new(desc(1).block_size(64)).unwrap();
    let src = world.add_source(source(DVec3::new(0.5, 0.0, 0.0))).unwrap();
    world.add_reflector(wall(4.0)).unwrap();
    let rec = world.add_receiver(Receiver::omni()).unwrap();
    for _ in 0..200 {
        world.source_audio_mut(src).unwrap().fill(1.0);
        world.process();
    }
    let previous = world.receiver_output(rec).unwrap()[0].clone();
    world.source_audio_mut(src).unwrap().fill(1.0);
    world.process();
    assert_eq!(world.receiver_output(rec).unwrap()[0], previous);
}

/// Renders `blocks` blocks of constant input and returns the last block.
fn steady(world: &mut AcousticWorld, src: SourceId, rec: ReceiverId, blocks: usize) -> Vec<f32> {
    for _ in 0..blocks {
        world.source_audio_mut(src).unwrap().fill(1.0);
        world.process();
    }
    world.receiver_output(rec).unwrap()[0].clone()
}

#[test]
fn test_disappearing_reflection_fades_out() {
    let mut world = AcousticWorld::new(desc(1).block_size(64)).unwrap();
    let src = world.add_source(source(DVec3::new(2.0, 0.0, 0.0))).unwrap();
    let wall_id = world.add_reflector(wall(4.0)).unwrap();
    let rec = world.add_receiver(Receiver::omni()).unwrap();
    let before = steady(&mut world, src, rec, 40);
    assert!(before[63] > 0.55);

    world.reflector_mut(wall_id).unwrap().active = false;
    let release = steady(&mut world, src, rec, 1);
    assert_eq!(world.acoustic_models().len(), 2);
    assert_eq!(world.total_point_sources(), 1);
    assert!((release[0] - before[63]).abs() < 0.01);
    assert!(release.windows(2).all(|w| w[1] <= w[0] + 1e-6));
    assert!((release[63] - 0.5).abs() < 1e-3);

    steady(&mut world, src, rec, 1);
    assert_eq!(world.acoustic_models().len(), 1);
}

#[test]
fn test_reflectivity_scales_reflection() {
    let render = |reflectivity: f32| {
        let mut world = AcousticWorld::new(desc(1)).unwrap();
        let src = world.add_source(source(DVec3::new(2.0, 0.0, 0.0))).unwrap();
        let mut reflector = wall(4.0);
        reflector.reflectivity = reflectivity;
        world.add_reflector(reflector).unwrap();
        let rec = world.add_receiver(Receiver::omni()).unwrap();
        impulse_response(&mut world, src, rec, 3)
    };
    let full = render(1.0);
    let half = render(0.5);
    assert!(full[600] > 0.05);
    assert!((half[600] / full[600] - 0.5).abs() < 1e-4);
    assert_eq!(full[200], half[200]);
}

#[test]
fn test_global_mask_gates_receiver() {
    let mut world = AcousticWorld::new(desc(0)).unwrap();
    let src = world.add_source(source(DVec3::new(2.0, 0.0, 0.0))).unwrap();
    let rec = world.add_receiver(Receiver::omni()).unwrap();
    let far_away = Shoebox::new(DVec3::new(50.0, 0.0, 0.0), DVec3::splat(1.0), ZyxEuler::IDENTITY);
    let mask = world.add_mask(Mask::new(far_away, 0.0)).unwrap();

    let out = steady(&mut world, src, rec, 2);
    assert!(out.iter().all(|x| *x == 0.0));
    assert_eq!(world.active_point_sources(), 1);

    world.receiver_mut(rec).unwrap().use_global_mask = false;
    let out = steady(&mut world, src, rec, 2);
    assert!((out[BLOCK - 1] - 0.5).abs() < 1e-3);

    world.receiver_mut(rec).unwrap().use_global_mask = true;
    world.command_sender().send(SceneCommand::SetMaskActive(mask, false)).unwrap();
    let out = steady(&mut world, src, rec, 2);
    assert!((out[BLOCK - 1] - 0.5).abs() < 1e-3);
}

#[test]
fn test_receiver_delay_compensation_shortens_paths() {
    let mut world = AcousticWorld::new(desc(0)).unwrap();
    let src = world.add_source(source(DVec3::new(4.0, 0.0, 0.0))).unwrap();
    let mut receiver = Receiver::omni();
    // 3.4 m of propagation
    receiver.delay_comp = 0.01;
    let rec = world.add_receiver(receiver).unwrap();
    let out = impulse_response(&mut world, src, rec, 2);
    assert_eq!(peak(&out).0, 60);
}

#[test]
fn test_legacy_cut_point_rejects_images_outside_face() {
    let build = |legacy: bool| {
        let mut world = AcousticWorld::new(desc(1).legacy_cut_point(legacy)).unwrap();
        world.add_source(source(DVec3::new(2.0, 1.5, 0.0))).unwrap();
        world.add_reflector(wall(4.0).with_edge_reflection(false)).unwrap();
        world
            .add_receiver(Receiver::omni().at(DVec3::new(0.0, -1.5, 0.0)))
            .unwrap();
        world.process();
        world
    };
    // the receiver's own path hits the face at y = 0.5
    let current = build(false);
    assert_eq!(current.image_sources(), 1);
    assert_eq!(current.total_point_sources(), 2);
    assert_eq!(current.active_point_sources(), 2);

    // the source's foot point at y = 1.5 is off the face
    let legacy = build(true);
    assert_eq!(legacy.image_sources(), 0);
    assert_eq!(legacy.total_point_sources(), 1);
}

#[test]
fn test_sinc_interpolated_path() {
    let build = |order: usize| {
        let mut world = AcousticWorld::new(desc(0)).unwrap();
        let src = world
            .add_source(source(DVec3::new(2.005, 0.0, 0.0)).with_sinc_order(order))
            .unwrap();
        let rec = world.add_receiver(Receiver::omni()).unwrap();
        (world, src, rec)
    };
    let (mut linear, a, ra) = build(0);
    let (mut sinc, b, rb) = build(4);
    let linear_out = impulse_response(&mut linear, a, ra, 2);
    let sinc_out = impulse_response(&mut sinc, b, rb, 2);
    // half a sample of delay spreads the sinc kernel over 8 taps
    assert_eq!(linear_out[197], 0.0);
    assert!(sinc_out[197].abs() > 1e-4);
    assert_eq!(sinc_out[196], 0.0);

    let out = steady(&mut sinc, b, rb, 8);
    assert!((out[BLOCK - 1] as f64 * 2.005 - 1.0).abs() < 0.05);
}

#[test]
fn test_source_without_direct_path_keeps_reflections() {
    let mut world = AcousticWorld::new(desc(1)).unwrap();
    let src = world
        .add_source(source(DVec3::new(2.0, 0.0, 0.0)).without_direct_path())
        .unwrap();
    world.add_reflector(wall(4.0)).unwrap();
    let rec = world.add_receiver(Receiver::omni()).unwrap();

    let out = impulse_response(&mut world, src, rec, 3);
    assert_eq!(world.image_sources(), 1);
    assert_eq!(world.total_point_sources(), 1);
    assert!(out[200].abs() < 1e-6);
    assert_eq!(peak(&out).0, 600);
}

#[test]
fn test_source_level_follows_input() {
    let mut world = AcousticWorld::new(desc(0)).unwrap();
    let src = world.add_source(source(DVec3::new(2.0, 0.0, 0.0))).unwrap();
    world.add_receiver(Receiver::omni()).unwrap();
    world.process();
    assert_eq!(world.source(src).unwrap().rms_level(), 0.0);

    world.source_audio_mut(src).unwrap().fill(0.5);
    world.process();
    assert_eq!(world.source(src).unwrap().rms_level(), 0.5);
}

#[test]
fn test_muted_receiver_is_silent_from_the_first_block() {
    let mut world = AcousticWorld::new(desc(0)).unwrap();
    let src = world.add_source(source(DVec3::new(1.0, 0.0, 0.0))).unwrap();
    let mut receiver = Receiver::omni();
    receiver.gain = 0.0;
    let rec = world.add_receiver(receiver).unwrap();
    let out = steady(&mut world, src, rec, 1);
    assert!(out.iter().all(|x| *x == 0.0));

    world.command_sender().set_receiver_gain(rec, 1.0).unwrap();
    let out = steady(&mut world, src, rec, 2);
    assert!((out[BLOCK - 1] - 1.0).abs() < 1e-3);
}

#[test]
fn test_unbounded_max_distance_is_clamped() {
    let mut world = AcousticWorld::new(desc(0).max_path_distance(25.0)).unwrap();
    let src = world.add_source(source(DVec3::new(2.0, 0.0, 0.0))).unwrap();
    let rec = world.add_receiver(Receiver::omni()).unwrap();
    world.source_mut(src).unwrap().max_distance = f64::INFINITY;
    let out = impulse_response(&mut world, src, rec, 2);
    assert_eq!(peak(&out).0, 200);
    assert_eq!(world.total_point_sources(), 1);
}
