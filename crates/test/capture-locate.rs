//! One-shot probe: capture the first device's screen and report where a
//! template matches and with what confidence.
//!
//! usage: capture-locate <template.png> [out.png]

use std::path::Path;
use std::time::Duration;

use image::Rgb;

use droidtap_core::error::ImageSource;
use droidtap_core::locator::{best_match, decode};
use droidtap_core::platform::adb::AdbGateway;
use droidtap_core::platform::{select_device, DeviceGateway, GatewayOptions};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let Some(template_path) = args.get(1) else {
        eprintln!("usage: capture-locate <template.png> [out.png]");
        std::process::exit(2);
    };

    let tmp = std::env::temp_dir().join("droidtap-probe");
    std::fs::create_dir_all(&tmp).expect("create tmp dir");
    let gw = AdbGateway::new(GatewayOptions { tmp_dir: tmp, command_timeout: Duration::from_secs(15) });
    let id = select_device(&gw.list_devices().expect("list devices"), None).expect("no device");

    let cap = gw.capture(&id).expect("capture");
    let screen = decode(&cap.data, ImageSource::Screen).expect("decode screen");
    let template = image::open(Path::new(template_path)).expect("open template").to_rgb8();

    let started = std::time::Instant::now();
    let best = best_match(&screen.to_rgb8(), &template).expect("match");
    let took = started.elapsed();

    match best {
        Some(m) => {
            println!(
                "best match at {:?}, confidence {:.4}, center ({}, {}), took {:?}",
                m.top_left,
                m.score,
                m.top_left.0 + template.width() / 2,
                m.top_left.1 + template.height() / 2,
                took
            );
            if let Some(out) = args.get(2) {
                let mut marked = screen.to_rgb8();
                let (x0, y0) = m.top_left;
                for dx in 0..template.width() {
                    marked.put_pixel(x0 + dx, y0, Rgb([255, 0, 0]));
                    marked.put_pixel(x0 + dx, y0 + template.height() - 1, Rgb([255, 0, 0]));
                }
                for dy in 0..template.height() {
                    marked.put_pixel(x0, y0 + dy, Rgb([255, 0, 0]));
                    marked.put_pixel(x0 + template.width() - 1, y0 + dy, Rgb([255, 0, 0]));
                }
                marked.save(out).expect("save marked screenshot");
                println!("saved {}", out);
            }
        }
        None => println!("empty template"),
    }
    gw.cleanup(&id).ok();
}
