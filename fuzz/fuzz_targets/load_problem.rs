#![no_main]
use libfuzzer_sys::fuzz_target;

const DOMAIN: &str = include_str!("../../demos/logistics/domain.carri");

fuzz_target!(|data: &[u8]| {
    let Ok(domain) = carri_syntax::parse_domain(DOMAIN) else {
        return;
    };
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(problem) = carri_syntax::parse_problem(s) {
            let _ = carri_model::Schema::build(&domain, &problem);
        }
    }
});
