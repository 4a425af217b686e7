// cglib-winsys/demos/swap_loop.rs
//
//! Connects to the best available windowing system, shows an onscreen and swaps it a fixed
//! number of times, throttled by the frame-complete events.
//!
//! Nothing is drawn; only the event flow is shown. For example:
//! `cargo run --example swap_loop -- --winsys EGL_NULL --frames 10`.

use cglib_winsys::{Display, FrameEvent, Onscreen, Renderer, WinsysId};

use clap::{App, Arg};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

static APP_NAME: &'static str = "cglib-winsys swap loop";

fn main() {
    let matches = App::new(APP_NAME)
        .arg(
            Arg::with_name("winsys")
                .short("w")
                .long("winsys")
                .takes_value(true)
                .help("Backend to use, e.g. EGL_XLIB or EGL_NULL"),
        )
        .arg(
            Arg::with_name("frames")
                .short("n")
                .long("frames")
                .takes_value(true)
                .default_value("60")
                .help("Number of frames to present"),
        )
        .arg(
            Arg::with_name("resizable")
                .short("r")
                .long("resizable")
                .help("Let the window manager resize the window"),
        )
        .get_matches();

    let frames: i64 = matches.value_of("frames").unwrap().parse().unwrap();

    let renderer = Renderer::new();
    if let Some(name) = matches.value_of("winsys") {
        let id = WinsysId::from_name(name)
            .unwrap_or_else(|| panic!("Unknown window system {:?}", name));
        renderer.set_winsys_id(id);
    }
    renderer.connect().unwrap();
    println!(
        "Connected to {} with EGL {:?}",
        renderer.winsys_id().unwrap().name(),
        renderer.egl_version().unwrap()
    );

    let display = Display::new(&renderer, None);
    display.setup().unwrap();

    let onscreen = Onscreen::new(&display, 640, 480);
    onscreen.set_resizable(matches.is_present("resizable"));
    onscreen.show();

    let completed = Rc::new(Cell::new(0));
    let ready = Rc::new(Cell::new(true));
    {
        let completed = completed.clone();
        let ready = ready.clone();
        onscreen.add_frame_callback(move |_, event, info| {
            if event == FrameEvent::Complete {
                completed.set(completed.get() + 1);
                ready.set(true);
                println!(
                    "frame {} presented at {} ns",
                    info.frame_counter(),
                    info.presentation_time()
                );
            }
        });
    }
    onscreen.add_resize_callback(|_, width, height| println!("resized to {}x{}", width, height));
    onscreen.add_dirty_callback(|_, rect| println!("dirty {:?}", rect));

    while completed.get() < frames {
        if ready.replace(false) && onscreen.frame_counter() < frames {
            onscreen.begin_frame();
            onscreen.swap_buffers();
        }
        renderer.run_once(Some(Duration::from_millis(100))).unwrap();
    }
}
