// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("virt-prep")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Fedora CI Contributors")
        .about("Prepare a qcow2 image for a Fedora release with task rpms installed")
        .arg(
            Arg::new("release")
                .short('r')
                .long("release")
                .required(true)
                .help("Fedora release, e.g. rawhide or f33"),
        )
        .arg(
            Arg::new("task_id")
                .short('t')
                .long("task-id")
                .action(ArgAction::Append)
                .help("Koji task whose rpms are staged and installed"),
        )
        .arg(
            Arg::new("additional_task_id")
                .long("additional-task-id")
                .action(ArgAction::Append)
                .help("Koji task staged as a repository only"),
        )
        .arg(
            Arg::new("artifacts")
                .short('a')
                .long("artifacts")
                .default_value("./")
                .help("Directory for logs, images and repositories"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Write the customized image here instead of in place"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("install_rpms")
                .long("install-rpms")
                .action(ArgAction::SetTrue)
                .help("Install rpms from --task-id repositories"),
        )
        .arg(
            Arg::new("no_sys_update")
                .long("no-sys-update")
                .action(ArgAction::SetTrue)
                .help("Skip the full system upgrade"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("virt-prep.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
