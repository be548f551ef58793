//! Command-line driver.
//!
//! Computes the regulator, and optionally the class group, of each real
//! quadratic order given by its discriminant, printing a summary line per
//! order and a JSON report at the end when requested.

use std::process::ExitCode;
use std::str::FromStr;
use std::time::Instant;

use num_bigint::BigInt;
use serde::Serialize;

use regulator_bsgs::{
    compute_class_group, compute_regulator, QuadraticOrder, SearchParams,
};

#[derive(Serialize)]
struct OrderReport {
    discriminant: String,
    regulator: f64,
    h_star: u64,
    case: String,
    table_entries: usize,
    giant_steps: u64,
    class_number: Option<u64>,
    invariants: Option<Vec<u64>>,
    time_ms: f64,
}

struct Args {
    discriminants: Vec<BigInt>,
    params: SearchParams,
    class_group: bool,
    json: bool,
}

const USAGE: &str = "usage: regulator-bsgs [options] <discriminant>...
  --class-group      also compute the class group structure
  --terms <n>        L-function series terms (default 50000)
  --workers <n>      worker threads (default 1)
  --memory <mib>     table memory budget in MiB (default 64)
  --json             print a JSON report after the summary lines";

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        discriminants: Vec::new(),
        params: SearchParams::default(),
        class_group: false,
        json: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--class-group" => args.class_group = true,
            "--json" => args.json = true,
            "--terms" => {
                let v = it.next().ok_or("--terms needs a value")?;
                args.params.terms = v.parse().map_err(|_| format!("bad --terms: {}", v))?;
            }
            "--workers" => {
                let v = it.next().ok_or("--workers needs a value")?;
                args.params.workers = v.parse().map_err(|_| format!("bad --workers: {}", v))?;
            }
            "--memory" => {
                let v = it.next().ok_or("--memory needs a value")?;
                let mib: usize = v.parse().map_err(|_| format!("bad --memory: {}", v))?;
                args.params.max_memory = mib << 20;
            }
            "--help" | "-h" => return Err(USAGE.to_string()),
            other => {
                let d = BigInt::from_str(other)
                    .map_err(|_| format!("not a discriminant: {}", other))?;
                args.discriminants.push(d);
            }
        }
    }
    if args.discriminants.is_empty() {
        return Err(USAGE.to_string());
    }
    Ok(args)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = match parse_args() {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("{}", msg);
            return ExitCode::FAILURE;
        }
    };

    let mut reports = Vec::new();
    for delta in &args.discriminants {
        let order = match QuadraticOrder::new(delta.clone(), args.params.precision) {
            Ok(o) => o,
            Err(e) => {
                eprintln!("D = {}: {}", delta, e);
                return ExitCode::FAILURE;
            }
        };

        let start = Instant::now();
        let reg = match compute_regulator(&order, &args.params) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("D = {}: {}", delta, e);
                return ExitCode::FAILURE;
            }
        };

        let (class_number, invariants) = if args.class_group {
            match compute_class_group(&order, &reg, &args.params) {
                Ok(cg) => (Some(cg.class_number), Some(cg.invariants)),
                Err(e) => {
                    eprintln!("D = {}: {}", delta, e);
                    return ExitCode::FAILURE;
                }
            }
        } else {
            (None, None)
        };
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;

        match (&class_number, &invariants) {
            (Some(h), Some(inv)) => println!(
                "D = {}: R = {:.12}, h = {}, group = {:?} | {:.1}ms",
                delta, reg.regulator, h, inv, elapsed
            ),
            _ => println!(
                "D = {}: R = {:.12}, h* ~ {} via {:?} | {:.1}ms",
                delta, reg.regulator, reg.h_star, reg.case, elapsed
            ),
        }

        reports.push(OrderReport {
            discriminant: delta.to_string(),
            regulator: reg.regulator,
            h_star: reg.h_star,
            case: format!("{:?}", reg.case),
            table_entries: reg.table_entries,
            giant_steps: reg.giant_steps,
            class_number,
            invariants,
            time_ms: elapsed,
        });
    }

    if args.json {
        match serde_json::to_string_pretty(&reports) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("report serialization failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}
