use std::time::Duration;

use clap::{App, AppSettings, Arg, SubCommand};

use crate::{
    build_solver, floating_type_mod::FT, ErosionParams, SceneConfig, SceneKind, SimulationParams,
};

use super::snapshot_exporter::SnapshotExporter;

const CARGO_PKG_AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");
const CARGO_PKG_VERSION: &'static str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &'static str = env!("CARGO_PKG_DESCRIPTION");

/** Playback cursor of the fixed-rate output animation. */
struct Frame {
    index: usize,
    time_interval: FT,
}

impl Frame {
    fn new(fps: FT) -> Frame {
        Frame {
            index: 0,
            time_interval: 1. / fps,
        }
    }

    fn advance(&mut self) {
        self.index += 1;
    }
}

pub fn start() {
    let matches = App::new("Erosive SPH Simulation")
        .version(CARGO_PKG_VERSION)
        .author(CARGO_PKG_AUTHORS)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("run")
                .about("Run a scene and export one snapshot per frame")
                .arg(
                    Arg::with_name("SCENE")
                        .help("Scene to simulate: dam-break or terrain-erosion")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .long("params")
                        .short("p")
                        .required(false)
                        .takes_value(true)
                        .help("YAML file overriding the scene's simulation parameters"),
                )
                .arg(
                    Arg::with_name("EROSION_CONFIG")
                        .long("erosion-params")
                        .short("e")
                        .required(false)
                        .takes_value(true)
                        .help("YAML file overriding the erosion parameters"),
                )
                .arg(
                    Arg::with_name("FRAMES")
                        .long("frames")
                        .short("n")
                        .takes_value(true)
                        .default_value("100")
                        .help("Number of frames to simulate"),
                )
                .arg(
                    Arg::with_name("FPS")
                        .long("fps")
                        .takes_value(true)
                        .default_value("60")
                        .help("Frames per second of the output animation"),
                )
                .arg(
                    Arg::with_name("SPACING")
                        .long("spacing")
                        .short("s")
                        .required(false)
                        .takes_value(true)
                        .help("Target particle spacing in meters"),
                )
                .arg(
                    Arg::with_name("MAX_PARTICLES")
                        .long("max-particles")
                        .short("m")
                        .required(false)
                        .takes_value(true)
                        .help("Particle budget of the scene emitter"),
                )
                .arg(
                    Arg::with_name("OUTPUT_DIR")
                        .long("output")
                        .short("o")
                        .takes_value(true)
                        .default_value("./snapshots")
                        .help("Directory where per-frame snapshots are written"),
                ),
        )
        .get_matches();

    if let Some(run_matches) = matches.subcommand_matches("run") {
        let scene_kind = match run_matches.value_of("SCENE").expect("missing scene name") {
            "dam-break" => SceneKind::DamBreak,
            "terrain-erosion" => SceneKind::TerrainErosion,
            other => panic!("unknown scene `{}`, expected dam-break or terrain-erosion", other),
        };

        let simulation_params: Option<SimulationParams> =
            run_matches.value_of("SIMULATION_CONFIG").map(|parameter_file| {
                let params_yaml = std::fs::read_to_string(parameter_file).expect("failed reading parameter file");
                serde_yaml::from_str(&params_yaml).expect("failed parsing simulation config file")
            });
        if let Some(params) = &simulation_params {
            println!("{:?}", params);
        }

        let erosion_params: ErosionParams = match run_matches.value_of("EROSION_CONFIG") {
            Some(erosion_file) => {
                let erosion_yaml = std::fs::read_to_string(erosion_file).expect("failed reading erosion file");
                serde_yaml::from_str(&erosion_yaml).expect("failed parsing erosion config file")
            }
            None => ErosionParams::default(),
        };

        let mut scene = SceneConfig {
            kind: scene_kind,
            ..SceneConfig::default()
        };
        if let Some(spacing) = run_matches.value_of("SPACING") {
            scene.target_spacing = spacing.parse::<FT>().expect("spacing must be a number");
        }
        if let Some(max_particles) = run_matches.value_of("MAX_PARTICLES") {
            scene.max_number_of_particles = max_particles.parse::<usize>().expect("max-particles must be an integer");
        }
        println!("{:?}", scene);

        let number_of_frames = run_matches
            .value_of("FRAMES")
            .unwrap()
            .parse::<usize>()
            .expect("frames must be an integer");
        let fps = run_matches.value_of("FPS").unwrap().parse::<FT>().expect("fps must be a number");
        let output_dir = run_matches.value_of("OUTPUT_DIR").unwrap();

        run_simulation(scene, simulation_params, erosion_params, number_of_frames, fps, output_dir);
    } else {
        unreachable!()
    }
}

fn run_simulation(
    scene: SceneConfig,
    simulation_params: Option<SimulationParams>,
    erosion_params: ErosionParams,
    number_of_frames: usize,
    fps: FT,
    output_dir: &str,
) {
    let mut solver = build_solver(scene, simulation_params, erosion_params);
    let mut exporter = SnapshotExporter::new(output_dir, "erosive-sph");
    let mut frame = Frame::new(fps);

    let mut total_duration: Duration = Duration::from_nanos(0);

    while frame.index < number_of_frames {
        let a = std::time::Instant::now();
        solver.advance_frame(frame.time_interval);
        let b = std::time::Instant::now();
        total_duration += b - a;

        exporter.add_snapshot(&solver);
        frame.advance();

        println!(
            "{:05}: {} particles, density error ratio {:.4}, {}msec ({}msec AVG)",
            frame.index,
            solver.particles().len(),
            solver.last_density_error_ratio(),
            (b - a).as_secs_f32() * 1000.,
            (total_duration / frame.index as u32).as_secs_f32() * 1000.
        );
    }
}
