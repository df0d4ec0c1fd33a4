// src/bin/moving_window.rs
//
// Moving window along a 1D track:
//   holder [0,100] x [0,10] x [0,1], window A [20,50] x [0,10] x [0,1]
//   m = +x for x < 40, -x beyond (a head-to-head wall inside the window)
//   window moves at v = (2,0,0) with clip (5,0,0)
//
// Usage:
//   cargo run --release --bin moving_window -- [config.json] [steps=<n>] [dt=<t>]
//
// Outputs: out/moving_window/track_config.json, out/moving_window/table.csv

use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;

use llg_track::config::TrackWindowConfig;
use llg_track::mesh::{Mesh, MeshKind};
use llg_track::region::Rect3;
use llg_track::registry::MeshSet;
use llg_track::track::ShiftOutcome;

fn usage() -> ! {
    eprintln!(
        "Usage:
  cargo run --release --bin moving_window -- [config.json] [steps=<n>] [dt=<t>]

Outputs:
  out/moving_window/track_config.json
  out/moving_window/table.csv
"
    );
    std::process::exit(2);
}

struct Args {
    config: Option<String>,
    steps: usize,
    dt: f64,
}

fn parse_args() -> Args {
    let mut a = Args {
        config: None,
        steps: 20,
        dt: 0.5,
    };
    for arg in std::env::args().skip(1) {
        if let Some(v) = arg.strip_prefix("steps=") {
            a.steps = v.parse().unwrap_or_else(|_| usage());
        } else if let Some(v) = arg.strip_prefix("dt=") {
            a.dt = v.parse().unwrap_or_else(|_| usage());
        } else if arg.ends_with(".json") {
            a.config = Some(arg);
        } else {
            usage();
        }
    }
    a
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = parse_args();

    let cfg = match &args.config {
        Some(path) => TrackWindowConfig::from_path(Path::new(path))?,
        None => TrackWindowConfig {
            holder: 0,
            windows: vec![1],
            velocity: [2.0, 0.0, 0.0],
            clip: [5.0, 0.0, 0.0],
        },
    };

    let cellsize = [5.0, 5.0, 1.0];
    let wall = |p: [f64; 3]| if p[0] < 40.0 { [1.0, 0.0, 0.0] } else { [-1.0, 0.0, 0.0] };

    let mut holder = Mesh::new(
        cfg.holder,
        "holder",
        MeshKind::Ferromagnetic,
        Rect3::new([0.0; 3], [100.0, 10.0, 1.0]),
        cellsize,
    );
    holder.init_with(wall);
    holder.set_dormant(true);

    let mut meshes = MeshSet::new();
    meshes.add(holder)?;
    for (n, &id) in cfg.windows.iter().enumerate() {
        let w = Mesh::new(
            id,
            format!("window{n}"),
            MeshKind::Ferromagnetic,
            Rect3::new([20.0, 0.0, 0.0], [50.0, 10.0, 1.0]),
            cellsize,
        );
        meshes.add(w)?;
    }

    let out_dir = Path::new("out").join("moving_window");
    create_dir_all(&out_dir)?;
    cfg.write_to_dir(&out_dir)?;

    let report = meshes.apply_config(&cfg)?;
    info!(
        "tracking {:?}, {} cells moved into windows",
        report.tracked, report.cells_copied
    );
    meshes.initialize_run()?;

    let mut f = BufWriter::new(File::create(out_dir.join("table.csv"))?);
    writeln!(f, "t,shift_x,debt_x,holder_x0,holder_occupied")?;

    for step in 1..=args.steps {
        let t = step as f64 * args.dt;
        meshes.set_step(t, true);
        let shifted = meshes.prepare_new_iteration()?;

        let shift_x: f64 = shifted
            .iter()
            .filter_map(|(_, o)| match o {
                ShiftOutcome::Shifted { shift, .. } => Some(shift[0]),
                _ => None,
            })
            .sum();
        let Some(h) = meshes.get(cfg.holder) else {
            break;
        };
        writeln!(
            f,
            "{:.6e},{:.6e},{:.6e},{:.6e},{}",
            t,
            shift_x,
            h.track.shift_debt()[0],
            h.rect().s[0],
            h.magnetization().active().n_occupied()
        )?;
    }

    println!("Wrote {}", out_dir.join("table.csv").display());
    Ok(())
}
