use carri_model::{apply_updates, Bindings, Evaluate, Schema, Value};
use carri_syntax::{
    parse_domain, parse_expr, parse_problem, parse_updates, scan_blocks, Domain, Scope, SlotKind,
    SourceLine,
};
use proptest::prelude::*;

const DOMAIN: &str = "\
Start Domain:
Entities:
Vehicle, Package
End Entities
Variables:
var charge INT - Vehicle
var visited MULTY - Vehicle
items Package var package onEntity INT, const package weight INT
End Variables
End Domain
";

fn problem(charges: &[i64], packages: &[(i64, i64)]) -> String {
    let charges: Vec<String> = charges.iter().map(i64::to_string).collect();
    let mut text = format!(
        "Start Problem:\nVehicle: {}\ncharge: {}\n",
        charges.len(),
        charges.join(", ")
    );
    if !packages.is_empty() {
        text.push_str("Package:\n");
        for (on, weight) in packages {
            text.push_str(&format!("({}, {})\n", on, weight));
        }
    }
    text.push_str("End Problem\n");
    text
}

fn load(charges: &[i64], packages: &[(i64, i64)]) -> (Domain, Schema) {
    let domain = parse_domain(DOMAIN).unwrap();
    let problem = parse_problem(&problem(charges, packages)).unwrap();
    let schema = Schema::build(&domain, &problem).unwrap();
    (domain, schema)
}

fn vehicle_scope(domain: &Domain) -> Scope {
    let vehicle = domain.symbols.lookup_entity("Vehicle").unwrap();
    Scope::new().extend("v", SlotKind::Entity(vehicle))
}

fn effects(domain: &Domain, lines: &[&str]) -> Vec<carri_syntax::Update> {
    let lines: Vec<SourceLine> = lines
        .iter()
        .enumerate()
        .map(|(i, t)| SourceLine::new(*t, i as u32 + 1, 1))
        .collect();
    let blocks = scan_blocks(&lines).unwrap();
    parse_updates(&blocks, &domain.symbols, &vehicle_scope(domain))
        .unwrap()
        .0
}

#[test]
fn evaluation_examples() {
    let (domain, schema) = load(&[5, 5], &[]);
    let state = schema.initial_state();
    let scope = vehicle_scope(&domain);
    let eval = |text: &str| {
        parse_expr(text, 1, 1, &domain.symbols, &scope)
            .unwrap()
            .evaluate(&schema, &state, &Bindings::with_params(&[1]))
            .unwrap()
    };
    assert_eq!(eval("2 + 3 * 4"), Value::int(14));
    assert_eq!(eval("true and false"), Value::bool(false));
    assert_eq!(eval("5 ? (1, 5, 9)"), Value::bool(true));
    assert_eq!(eval("charge v < 10"), Value::bool(true));
    assert_eq!(eval("(3, 4) @ (charge v - 4)"), Value::int(4));
}

proptest! {
    #[test]
    fn arithmetic_matches_i64(a in -1000i64..1000, b in -1000i64..1000, c in 1i64..50) {
        let (domain, schema) = load(&[0], &[]);
        let state = schema.initial_state();
        let text = format!("({}) + ({}) * ({}) - ({}) / {}", a, b, c, a, c);
        let expr = parse_expr(&text, 1, 1, &domain.symbols, &Scope::new()).unwrap();
        let value = expr.evaluate(&schema, &state, &Bindings::new()).unwrap();
        prop_assert_eq!(value, Value::int(a + b * c - a / c));
    }

    #[test]
    fn comparisons_match_i64(a in -50i64..50, b in -50i64..50) {
        let (domain, schema) = load(&[0], &[]);
        let state = schema.initial_state();
        for (op, expected) in [("<", a < b), ("<=", a <= b), (">", a > b), ("=", a == b), ("!=", a != b)] {
            let text = format!("({}) {} ({})", a, op, b);
            let expr = parse_expr(&text, 1, 1, &domain.symbols, &Scope::new()).unwrap();
            let value = expr.evaluate(&schema, &state, &Bindings::new()).unwrap();
            prop_assert_eq!(value, Value::bool(expected));
        }
    }

    #[test]
    fn snapshots_never_alias(
        charges in proptest::collection::vec(0i64..20, 1..5),
        packages in proptest::collection::vec((0i64..5, 0i64..9), 0..6),
        actor_seed in 0usize..5,
    ) {
        let (domain, schema) = load(&charges, &packages);
        let original = schema.initial_state();
        let before = original.snapshot();
        let actor = (actor_seed % charges.len()) as i64;

        let mut copy = original.snapshot();
        let updates = effects(&domain, &[
            "charge v: charge v + 3",
            "visited v: visited v + 7",
            "Package add: (v, 1)",
            "All (q - Package):",
            "package onEntity q: v",
            "End",
        ]);
        let mut bindings = Bindings::with_params(&[actor]);
        apply_updates(&updates, &schema, &mut copy, &mut bindings).unwrap();
        if !packages.is_empty() {
            let mut removal = copy.snapshot();
            let remove = effects(&domain, &["Package remove: 0"]);
            apply_updates(&remove, &schema, &mut removal, &mut bindings).unwrap();
            prop_assert!(!removal.collection(0).unwrap().contains(0));
            prop_assert!(copy.collection(0).unwrap().contains(0));
        }

        prop_assert_eq!(&original, &before);
        prop_assert_eq!(copy.collection(0).unwrap().len(), packages.len() + 1);
        prop_assert_eq!(
            copy.var(0).unwrap()[actor as usize].clone(),
            Value::int(charges[actor as usize] + 3)
        );
    }
}
