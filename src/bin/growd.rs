use grow_light_controller::*;
use std::{env, process};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Parses `R,S` into two intensities
fn parse_levels(arg: Option<&str>) -> std::result::Result<(Intensity, Intensity), String> {
    let levels: Vec<&str> = arg
        .ok_or("No intensity given")?
        .split(',')
        .map(str::trim)
        .collect();
    match levels.as_slice() {
        [red, sun] => {
            let parse = |s: &str| {
                s.parse::<u8>()
                    .map_err(|_| format!("Invalid intensity: {s}"))
                    .and_then(|v| Intensity::new(v).map_err(|e| e.to_string()))
            };
            Ok((parse(*red)?, parse(*sun)?))
        }
        _ => Err("Invalid intensity format. Use R,S (e.g., 40,0)".to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Get a target id/mac address from command line arguments.
    // If not provided, fall back to the stored login.
    let usage = "Usage: growd [<id/mac address>]";
    let args: Vec<_> = env::args().collect();
    if args.get(1).is_some_and(|a| a == "-h" || a == "--help") {
        eprintln!("{usage}");
        process::exit(0);
    }

    let store_path = env::var("GROWLIGHT_STORE").unwrap_or_else(|_| "growlight.json".into());
    let device = match args.get(1) {
        Some(id) => DeviceRef::new(id)?,
        None => match DeviceStore::open(store_path)?.device_id() {
            Some(device) => device,
            None => {
                eprintln!("{usage}");
                process::exit(1);
            }
        },
    };

    let stack = BtleplugStack::new(StackConfig::default()).await;
    let mut light = GrowLight::connect(&stack, &device).await?;

    // Inform about successful initialization
    println!("OK");

    // Mainloop: wait for user input, line by line
    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(input) = lines.next_line().await? {
        let mut cmd = input.trim().splitn(2, ':');
        let result = match cmd.next() {
            Some("light_on") => light.power_on().await.map_err(|e| e.to_string()),
            Some("light_off") => light.power_off().await.map_err(|e| e.to_string()),
            Some("set_intensity") => match parse_levels(cmd.next()) {
                Ok((red, sun)) => light
                    .set_intensity(red, sun)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e),
            },
            Some("status") => {
                println!(
                    "{} R{};S{}",
                    if light.is_on { "on" } else { "off" },
                    light.red_light.value(),
                    light.sunlight.value()
                );
                continue;
            }
            Some("") | None => Err("No command given".to_string()),
            Some(other) => Err(format!("Unknown command: {other}")),
        };

        match result {
            Ok(()) => println!("OK"),
            Err(e) => eprintln!("ERR {e}"),
        }
    }

    light.disconnect().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_levels() {
        let (red, sun) = parse_levels(Some("40, 0")).unwrap();
        assert_eq!((red.value(), sun.value()), (40, 0));
    }

    #[test]
    fn rejects_bad_levels() {
        assert!(parse_levels(None).is_err());
        assert!(parse_levels(Some("40")).is_err());
        assert!(parse_levels(Some("101,0")).is_err());
        assert!(parse_levels(Some("red,0")).is_err());
    }
}
