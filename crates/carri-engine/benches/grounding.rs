//! Criterion benchmarks for action grounding.
//!
//! Run with: cargo bench -p carri-engine

use carri_engine::{Actor, FirstLegal, SimulationConfig, Simulator};
use carri_model::Schema;
use carri_syntax::{parse_domain, parse_problem, Domain};
use criterion::{criterion_group, criterion_main, Criterion};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

fn demos_dir() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("demos")
}

fn load(name: &str) -> (Domain, Arc<Schema>) {
    let dir = demos_dir().join(name);
    let domain = parse_domain(&fs::read_to_string(dir.join("domain.carri")).unwrap()).unwrap();
    let problem = parse_problem(&fs::read_to_string(dir.join("problem.carri")).unwrap()).unwrap();
    let schema = Arc::new(Schema::build(&domain, &problem).unwrap());
    (domain, schema)
}

/// A logistics problem with many packages spread over a ring of locations.
fn large_logistics(vehicles: usize, locations: usize, packages: usize) -> (Domain, Arc<Schema>) {
    let source = fs::read_to_string(demos_dir().join("logistics/domain.carri")).unwrap();
    let domain = parse_domain(&source).unwrap();

    let mut problem = String::from("Start Problem:\n");
    problem.push_str(&format!("Vehicle: {}\nLocation: {}\n", vehicles, locations));
    problem.push_str("charge: 10\nadjacent:\n");
    for l in 0..locations {
        let prev = (l + locations - 1) % locations;
        let next = (l + 1) % locations;
        problem.push_str(&format!("{}. {{{} {}}}\n", l, prev, next));
    }
    problem.push_str("distance:\n");
    for l in 0..locations {
        let prev = (l + locations - 1) % locations;
        let next = (l + 1) % locations;
        problem.push_str(&format!("{}. [{}:1 {}:1]\n", l, prev, next));
    }
    problem.push_str("station:\n0. true\nPackage:\n");
    for p in 0..packages {
        problem.push_str(&format!(
            "(-1, {}, {})\n",
            p % locations,
            (p * 7 + 3) % locations
        ));
    }
    problem.push_str("End Problem\n");

    let problem = parse_problem(&problem).unwrap();
    let schema = Arc::new(Schema::build(&domain, &problem).unwrap());
    (domain, schema)
}

fn bench_ground(c: &mut Criterion, name: &str, domain: &Domain, schema: Arc<Schema>) {
    let sim = Simulator::new(schema, domain);
    let state = sim.state().snapshot();
    c.bench_function(name, |b| {
        b.iter(|| {
            let mut total = 0;
            for actor in sim.actor_instances(&state) {
                total += sim.legal_actions(&state, actor).len();
            }
            total
        })
    });
}

fn benchmarks(c: &mut Criterion) {
    let (domain, schema) = load("logistics");
    bench_ground(c, "ground_logistics_demo", &domain, schema);

    let (domain, schema) = large_logistics(8, 20, 200);
    bench_ground(c, "ground_V8_L20_P200", &domain, schema);

    let (domain, schema) = large_logistics(32, 50, 1000);
    bench_ground(c, "ground_V32_L50_P1000", &domain, schema);

    let (domain, schema) = large_logistics(8, 20, 200);
    c.bench_function("simulate_V8_L20_P200_50_steps", |b| {
        b.iter(|| {
            let config = SimulationConfig {
                max_steps: 50,
                ..Default::default()
            };
            let mut sim = Simulator::with_config(Arc::clone(&schema), &domain, config);
            sim.run(&mut FirstLegal).unwrap()
        })
    });

    let (domain, schema) = load("charging");
    let sim = Simulator::new(schema, &domain);
    let state = sim.state().snapshot();
    c.bench_function("ground_charging_single_actor", |b| {
        b.iter(|| sim.legal_actions(&state, Actor { entity: 0, id: 0 }))
    });
}

criterion_group!(benches, benchmarks);
criterion_main!(benches);
