// cglib-winsys/build.rs
//
//! The `cglib-winsys` build script.

use cfg_aliases::cfg_aliases;
use gl_generator::{Api, Fallbacks, Profile, Registry, StructGenerator};
use std::env;
use std::fs::File;
use std::path::PathBuf;

fn main() {
    // Setup aliases for #[cfg] checks
    cfg_aliases! {
        // Platforms
        android: { target_os = "android" },
        linux: { all(unix, not(any(target_os = "macos", android, target_env = "ohos"))) },

        // Features:
        // The X11 backend needs Xlib, which is only available behind a feature on desktop Linux.
        x11: { all(linux, feature = "sm-x11") },
    }

    let target_family = env::var("CARGO_CFG_TARGET_FAMILY").ok();
    let dest = PathBuf::from(&env::var("OUT_DIR").unwrap());

    // Generate EGL bindings. Every backend in this crate sits on top of EGL.
    if target_family.as_ref().map_or(false, |f| f == "unix") {
        let mut file = File::create(&dest.join("egl_bindings.rs")).unwrap();
        let registry = Registry::new(Api::Egl, (1, 5), Profile::Core, Fallbacks::All, []);
        registry.write_bindings(StructGenerator, &mut file).unwrap();
    }
}
