use clap::Parser;
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use enzo_particles::checkpoint::Checkpoint;
use enzo_particles::config::{AccretionMode, ParticleParameters};
use enzo_particles::grid::{FieldKind, GridId};
use enzo_particles::hierarchy::Hierarchy;
use enzo_particles::index_space::{range3d, IndexSpace};
use enzo_particles::message::channel::ChannelCommunicator;
use enzo_particles::message::comm::Communicator;
use enzo_particles::particle::{EnabledId, ParticleRecord, ParticleType};
use enzo_particles::units::{Units, BOLTZMANN, PROTON_MASS, YR};
use enzo_particles::{Result, SimulationContext};




#[derive(Debug, Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// Enzo-style parameter file; built-in parameters are used otherwise.
    #[clap(short = 'p', long)]
    parameters: Option<String>,

    #[clap(short = 'r', long, default_value = "2")]
    num_ranks: usize,

    #[clap(short = 'n', long, default_value = "10")]
    num_steps: usize,

    /// Timestep in code units.
    #[clap(long, default_value = "0.001")]
    dt: f64,

    /// Gas temperature in Kelvin.
    #[clap(short = 't', long, default_value = "100.0")]
    temperature: f64,

    #[clap(short = 'o', long, default_value = "particles")]
    output: String,

    #[clap(short = 'v', long)]
    verbose: bool,
}




fn default_parameters() -> ParticleParameters {
    ParticleParameters {
        active_particle_types: vec!["Star".to_string(), "MBH".to_string()],
        maximum_refinement_level: 2,
        units: Units::from_box(1e3, 1.673e-24, 1e6 * YR),
        mbh_accretion: AccretionMode::FixedRate,
        mbh_accretion_fixed_rate: 1e-2,
        star_maker_over_density_threshold: 10.0,
        star_feedback_radius_cells: 2.0,
        ..ParticleParameters::default()
    }
}




/**
 * The root grid split into slabs along the first axis, one per rank, and
 * nested patches covering the central half of the level above, all held
 * by rank 0. The gas is uniform and falls toward the centre.
 */
fn build_hierarchy(rank: usize, size: usize, params: &ParticleParameters, opts: &Opts) -> Result<Hierarchy> {
    let [ni, nj, nk] = params.top_grid_dimensions;
    let mut h = Hierarchy::new(rank, params.top_grid_dimensions, params.refine_by)?;
    let units = params.units;
    let e = opts.temperature * BOLTZMANN / ((5.0 / 3.0 - 1.0) * 1.22 * PROTON_MASS) / units.velocity.powi(2);
    let mut next_id = 0;

    let mut add = |h: &mut Hierarchy, owner: usize, level: usize, space: IndexSpace| -> Result<()> {
        let grid = h.new_grid(GridId(next_id), owner, level, space).with_time(0.0, opts.dt);
        next_id += 1;

        let grid = if owner == rank {
            grid.with_uniform_gas(1e2, e)
                .with_field(FieldKind::Velocity1, |x| -(x[0] - 0.5))
                .with_field(FieldKind::Velocity2, |x| -(x[1] - 0.5))
                .with_field(FieldKind::Velocity3, |x| -(x[2] - 0.5))
                .with_field(FieldKind::TotalEnergy, |x| {
                    e + 0.5 * ((x[0] - 0.5).powi(2) + (x[1] - 0.5).powi(2) + (x[2] - 0.5).powi(2))
                })
        } else {
            grid
        };
        h.add_grid(grid)?;
        Ok(())
    };

    for r in 0..size {
        let (i0, i1) = ((r * ni / size) as i64, ((r + 1) * ni / size) as i64);
        add(&mut h, r, 0, range3d(i0..i1, 0..nj as i64, 0..nk as i64))?;
    }
    for level in 1..=params.maximum_refinement_level {
        let cells = |n: usize, x: f64| (x * (n * params.refine_by.pow(level as u32)) as f64).round() as i64;
        let (lo, hi) = (0.5 - 0.5f64.powi(level as i32 + 1), 0.5 + 0.5f64.powi(level as i32 + 1));
        let space = range3d(cells(ni, lo)..cells(ni, hi), cells(nj, lo)..cells(nj, hi), cells(nk, lo)..cells(nk, hi));
        add(&mut h, 0, level, space)?;
    }
    Ok(h)
}




fn run(comm: ChannelCommunicator, params: ParticleParameters, opts: &Opts) -> Result<()> {
    let rank = comm.rank();
    let mut hierarchy = build_hierarchy(rank, comm.size(), &params, opts)?;
    let mut sim = SimulationContext::new(params, rank, comm.size())?;
    let centre = [0.5 + 1e-3; 3];

    if hierarchy.locate(centre).map_or(false, |g| g.is_local(rank)) {
        let enabled_id = sim
            .registry()
            .by_type(ParticleType::Mbh)
            .and_then(|d| d.enabled_id())
            .unwrap_or(EnabledId(0));
        let id = sim.next_particle_id();
        hierarchy.attach(ParticleRecord::new(id, ParticleType::Mbh, enabled_id, centre, [0.0; 3], 1e5))?;
    }

    for step in 0..opts.num_steps {
        for report in sim.step(&mut hierarchy, &comm)? {
            if rank == 0 {
                info!(
                    "[{}] level {}: {} formed, {:.3e} Msun accreted, {:.3e} Msun ejected",
                    step, report.level, report.formed, report.engine.mass_accreted, report.engine.mass_ejected);
            }
        }
    }

    let checkpoint: Checkpoint = sim.checkpoint(&hierarchy)?;
    let file = std::fs::File::create(format!("{}.{}.cbor", opts.output, rank))
        .map_err(|e| enzo_particles::Error::Checkpoint(e.to_string()))?;
    checkpoint.write(std::io::BufWriter::new(file))?;
    info!("rank {} wrote {} particles at t={:.4}", rank, checkpoint.particles.len(), checkpoint.time);
    Ok(())
}




// ============================================================================
fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::parse();
    let level = if opts.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    SimpleLogger::new().with_level(level).init()?;

    let params = match &opts.parameters {
        Some(path) => ParticleParameters::parse(&std::fs::read_to_string(path)?)?,
        None => default_parameters(),
    };

    let results: Vec<Result<()>> = std::thread::scope(|scope| {
        let handles: Vec<_> = ChannelCommunicator::group(opts.num_ranks)
            .into_iter()
            .map(|comm| {
                let params = params.clone();
                let opts = &opts;
                scope.spawn(move || run(comm, params, opts))
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("rank thread panicked")).collect()
    });

    for result in results {
        result?;
    }
    Ok(())
}
