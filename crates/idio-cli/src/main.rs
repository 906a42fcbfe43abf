// SPDX-License-Identifier: GPL-3.0-or-later

//! `idio`: the executable entry point.
//!
//! Resolves the environment (spec.md §6.5), loads a compiled byte-code
//! image (spec.md §6.2), exposes the process identity as toplevel
//! bindings, runs the image to completion, and performs graceful shutdown
//! — module finalizers, then `exit(status)` (spec.md §6.1). Grounded on
//! `lona-vm`'s `bin/lona-vm.rs` entry-point shape and the `idio_main` /
//! `idio_init` sequence in `examples/original_source/src/idio.h`, adapted
//! from seL4 bare-metal boot to a standard host binary per `SPEC_FULL.md`
//! §10/§11.3.

use anyhow::{Context, Result};
use clap::Parser;
use idio_vm::heap::GenFilter;
use idio_vm::loader;
use idio_vm::value::Value;
use idio_vm::vm::Vm;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Load and run a compiled idio byte-code image.
#[derive(Debug, Parser)]
#[command(name = "idio", version, about)]
struct Cli {
    /// Path to a compiled byte-code image.
    image: PathBuf,

    /// Print the image's disassembly and module metadata instead of
    /// running it.
    #[arg(long)]
    dump: bool,
}

/// `IDIOLIB`/`PATH`/`PWD`/`HOSTNAME` resolution (spec.md §6.5).
struct Environment {
    idiolib: Vec<PathBuf>,
    path: Vec<PathBuf>,
    pwd: PathBuf,
    hostname: String,
}

fn resolve_environment() -> Environment {
    let idiolib = std::env::var_os("IDIOLIB")
        .map(|v| std::env::split_paths(&v).collect())
        .unwrap_or_else(|| vec![default_install_lib_dir()]);

    let path = std::env::var_os("PATH")
        .map(|v| std::env::split_paths(&v).collect())
        .unwrap_or_else(|| vec![PathBuf::from("/bin"), PathBuf::from("/usr/bin")]);

    let pwd = std::env::var_os("PWD")
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let hostname = std::env::var("HOSTNAME").ok().filter(|s| !s.is_empty()).unwrap_or_else(system_hostname);

    Environment { idiolib, path, pwd, hostname }
}

/// `<install>/lib`, derived from the running binary's own location since
/// there is no fixed install prefix baked in at build time.
fn default_install_lib_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .and_then(|bin_dir| bin_dir.parent().map(Path::to_path_buf))
        .map(|prefix| prefix.join("lib"))
        .unwrap_or_else(|| PathBuf::from("/usr/local/lib"))
}

fn system_hostname() -> String {
    nix::unistd::gethostname().ok().and_then(|h| h.into_string().ok()).unwrap_or_else(|| "localhost".to_owned())
}

/// Expose pid/ppid/uid/gid/groups as toplevel bindings (spec.md §6.1).
fn bind_process_identity(vm: &mut Vm) {
    let bindings: [(&str, i64); 4] = [
        ("%%pid", i64::from(nix::unistd::getpid().as_raw())),
        ("%%ppid", i64::from(nix::unistd::getppid().as_raw())),
        ("%%uid", i64::from(nix::unistd::getuid().as_raw())),
        ("%%gid", i64::from(nix::unistd::getgid().as_raw())),
    ];
    for (name, value) in bindings {
        let index = vm.globals.reserve_toplevel(name);
        vm.globals.set_toplevel(index, Value::fixnum(value));
    }

    let groups: Vec<Value> = nix::unistd::getgroups().unwrap_or_default().into_iter().map(|g| Value::fixnum(i64::from(g.as_raw()))).collect();
    let mut list = Value::nil();
    for g in groups.into_iter().rev() {
        list = vm.heap.alloc_pair(g, list);
    }
    let index = vm.globals.reserve_toplevel("%%groups");
    vm.globals.set_toplevel(index, list);
}

const EXIT_STATUS_VAR: &str = "%%idio-exit-status";

fn exit_status_binding(vm: &mut Vm) -> u32 {
    let index = vm.globals.reserve_toplevel(EXIT_STATUS_VAR);
    vm.globals.set_toplevel(index, Value::fixnum(0));
    index
}

fn read_exit_status(vm: &Vm, index: u32) -> i32 {
    vm.globals.toplevel.get(index as usize).and_then(|v| v.as_fixnum()).and_then(|n| i32::try_from(n).ok()).unwrap_or(0)
}

/// Run every finalizer the GC has queued (spec.md §4.1, §5's "finalizers
/// run on the GC's timeline"). A finalizer that itself raises is logged
/// and skipped — finalizer exceptions are not propagated, matching the
/// teacher's own sweep-phase contract.
fn run_finalizers(vm: &mut Vm, finalizers: Vec<Value>) {
    for f in finalizers {
        if let Err(e) = vm.call_thunk(f) {
            warn!(target: "idio_vm::gc", error = %e, "finalizer raised; discarding");
        }
    }
}

fn graceful_shutdown(mut vm: Vm) {
    let (_, finalizers) = vm.heap.collect(GenFilter::Full, &[]);
    run_finalizers(&mut vm, finalizers);
}

fn init_logging() {
    let filter = std::env::var("IDIO_LOG").or_else(|_| std::env::var("RUST_LOG")).unwrap_or_else(|_| "warn".to_owned());
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new(filter)).init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let env = resolve_environment();

    info!(
        target: "idio_cli",
        idiolib = ?env.idiolib,
        path = ?env.path,
        pwd = ?env.pwd,
        hostname = %env.hostname,
        image = ?cli.image,
        "starting up"
    );

    let bytes = std::fs::read(&cli.image).with_context(|| format!("reading image {}", cli.image.display()))?;
    let image = loader::parse_image(&bytes).with_context(|| format!("parsing image {}", cli.image.display()))?;
    debug!(
        target: "idio_cli",
        constants = image.constants.len(),
        modules = image.modules.len(),
        code_units = image.code_units.len(),
        "image parsed"
    );

    if cli.dump {
        dump_image(&image);
        return Ok(());
    }

    let mut vm = Vm::new(Vec::new(), Vec::new());
    let (constants, _relocations) = loader::load_into_heap(&mut vm.heap, &image).context("materializing image constants")?;
    let code = image.code_units.into_iter().next().map(|u| u.code).unwrap_or_default();
    vm.load_segment(code, constants);

    bind_process_identity(&mut vm);
    let status_index = exit_status_binding(&mut vm);

    let status = match vm.run() {
        Ok(_) => read_exit_status(&vm, status_index),
        Err(e) => {
            tracing::error!(target: "idio_vm::vm", error = %e, "unhandled condition");
            1
        }
    };

    info!(target: "idio_cli", status, "shutting down");
    graceful_shutdown(vm);
    std::process::exit(status);
}

fn dump_image(image: &loader::Image) {
    println!("idio byte-code image: {} constant(s), {} module(s), {} code unit(s)", image.constants.len(), image.modules.len(), image.code_units.len());
    for m in &image.modules {
        println!("module {:?}: imports={:?} exports={:?}", m.name, m.imports, m.exports);
    }
    for (i, unit) in image.code_units.iter().enumerate() {
        println!("--- code unit {i} ---");
        print!("{}", idio_vm::bytecode::disassemble(&unit.code));
    }
}
