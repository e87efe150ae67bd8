#[macro_use]
extern crate log;

use gumdrop::Options;
use std::process;

use loadtest::config::LoadTestOptions;
use loadtest::progress::ProgressPrinter;
use loadtest::LoadTest;

fn main() {
    // Exits after displaying help with -h, or on unparseable options.
    let options = LoadTestOptions::parse_args_default_or_exit();
    if options.version {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return;
    }

    options.initialize_logger();

    let configuration = match options.validate() {
        Ok(configuration) => configuration,
        Err(e) => {
            eprintln!("{}\n", e);
            eprintln!("{}", LoadTestOptions::usage());
            process::exit(1);
        }
    };

    if !options.data_file.is_empty() {
        println!(
            "Read data from file: {}",
            String::from_utf8_lossy(&configuration.body)
        );
    }
    println!("{}", configuration.banner());
    if configuration.skips_certificate_verification() {
        println!("Skipping certificate verification.");
    }

    let mut load_test = LoadTest::new(configuration);
    let printer = if options.no_progress {
        None
    } else {
        let (sender, receiver) = flume::unbounded();
        load_test = load_test.with_progress(sender);
        Some(ProgressPrinter::spawn(receiver))
    };

    let result = load_test.execute();
    // The load test dropped its sender, the printer exits after the last marker.
    if let Some(printer) = printer {
        printer.finish();
    }

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            error!("load test failed: {}", e);
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    if options.no_progress {
        print!("{}", report);
    } else {
        print!("{}", report.colored());
    }

    if !options.report_file.is_empty() {
        if let Err(e) = report.write_json(&options.report_file) {
            eprintln!("failed to write report to {}: {}", options.report_file, e);
            process::exit(1);
        }
    }

    if report.failed_to_start() {
        eprintln!("No request could be sent.");
        process::exit(1);
    }
}
