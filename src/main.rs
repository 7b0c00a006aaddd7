use clap::Parser;
use std::process::ExitCode;

use kbd_probe::config::{AdbSettings, AppSettings, Config, TimingSettings};
use kbd_probe::device::{self, AdbDevice, DeviceError};
use kbd_probe::probe::Prober;

/// Exit code when the adb binary is not runnable
const EXIT_ADB_NOT_RUNNABLE: u8 = 2;
/// Exit code when no unique device can be resolved
const EXIT_NO_UNIQUE_DEVICE: u8 = 3;
/// Exit code when the requested serial is not attached
const EXIT_DEVICE_NOT_FOUND: u8 = 4;

/// kbd-probe - in-app keyboard traversal over ADB and UIAutomator dumps
#[derive(Parser, Debug)]
#[command(
    name = "kbd-probe",
    about = "Traverse an in-app keyboard via accessibility dumps and report behavioral anomalies",
    after_help = "ENVIRONMENT VARIABLES:\n\
        ADB       Path to the adb binary\n\
        SERIAL    Explicit device serial\n\
        PKG       Target application package\n\
        ACT       Launch component (pkg/.Activity)\n\
        UI_DUMP   On-device accessibility dump path"
)]
struct Args {
    /// Path to the adb binary
    #[arg(long, env = "ADB", default_value = "adb")]
    adb: String,

    /// Explicit device serial (required when several devices are attached)
    #[arg(long, env = "SERIAL")]
    serial: Option<String>,

    /// Target application package
    #[arg(long, env = "PKG", default_value = "com.carbit.inappkeyboard")]
    package: String,

    /// Launch component (pkg/.Activity)
    #[arg(long, env = "ACT", default_value = "com.carbit.inappkeyboard/.MainActivity")]
    activity: String,

    /// On-device path where uiautomator writes the dump
    #[arg(long, env = "UI_DUMP", default_value = "/sdcard/window_dump.xml")]
    dump_path: String,

    /// Output the report as JSON instead of the line protocol
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = Config {
        adb: AdbSettings {
            path: args.adb,
            serial: args.serial,
        },
        app: AppSettings {
            package: args.package,
            activity: args.activity,
            dump_path: args.dump_path,
        },
        timing: TimingSettings::defaults(),
    };

    if let Err(err) = device::preflight(&config.adb.path, config.timing.preflight_timeout) {
        eprintln!("ERROR: {}", err);
        return ExitCode::from(EXIT_ADB_NOT_RUNNABLE);
    }

    let serial = match device::resolve_serial(
        &config.adb.path,
        config.adb.serial.as_deref(),
        config.timing.command_timeout,
    ) {
        Ok(serial) => serial,
        Err(err @ DeviceError::NotFound { .. }) => {
            eprintln!("ERROR: {}", err);
            return ExitCode::from(EXIT_DEVICE_NOT_FOUND);
        }
        Err(err) => {
            eprintln!("ERROR: {}", err);
            return ExitCode::from(EXIT_NO_UNIQUE_DEVICE);
        }
    };

    println!("DEVICE {}", serial);
    let dev = AdbDevice::new(&config.adb.path, serial);

    let prober = Prober::new(&dev, &config);
    prober.relaunch_app();
    let report = prober.run_all();

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(err) => eprintln!("Warning: failed to serialize report: {}", err),
        }
    } else {
        println!("ANOMS {}", report.anomalies.len());
        for anomaly in &report.anomalies {
            println!("{}", anomaly);
        }
    }

    // Anomalies are reported, not fatal.
    ExitCode::SUCCESS
}
