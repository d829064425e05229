#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::{TempDir, tempdir};

pub const MARCH_CSV: &str = "\
Date,Total,Quantity,Size,Product,Status,State,Return Quantity
01/03/2024,\"10,50\",2,38,Shirt,paid,SP,0
15/03/2024,\"5,00\",1,40,Shirt,open,RJ,1
";

pub const APRIL_CSV: &str = "\
date,total,quantity,size,product,status,state,return quantity,coupon
02/04/2024,\"20,00\",3,38,Dress,paid,SP,0,SPRING
not a date,\"99,00\",9,42,Dress,paid,MG,0,
";

/// Scratch directory holding uploads and the consolidated store.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Location of the consolidated dataset for CLI runs.
    pub fn store_path(&self) -> PathBuf {
        self.temp_dir.path().join("consolidated.csv")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// The binary with `subcommand`, pointed at this workspace's store.
    pub fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::cargo_bin("sales-dashboard").expect("binary exists");
        cmd.current_dir(self.path())
            .env("RUST_LOG", "off")
            .arg(subcommand)
            .arg("--store")
            .arg(self.store_path());
        cmd
    }
}
