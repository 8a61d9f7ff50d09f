//! Shared fixture: five identical office-hours users and one outlier.

#![allow(dead_code)]

use insider_threat::config::AppConfig;
use std::fmt::Write as _;
use std::path::Path;
use tempfile::TempDir;

pub const NORMAL_USERS: [&str; 5] = ["alice", "bob", "carol", "dave", "erin"];
pub const OUTLIER: &str = "mallory";
const DAYS: [&str; 3] = ["01/04/2010", "01/05/2010", "01/06/2010"];

pub fn write(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}

/// Write logon/device/email/file CSVs in CERT layout.
pub fn write_fixture(dir: &Path) {
    let mut logon = String::from("id,date,user,pc,activity\n");
    let mut device = String::from("id,date,user,pc,activity\n");
    let mut email = String::from("id,date,user,pc,to,subject\n");
    let mut file = String::from("id,date,user,pc,filename\n");

    for (d, day) in DAYS.iter().enumerate() {
        for (u, user) in NORMAL_USERS.iter().enumerate() {
            let _ = writeln!(logon, "L{d}{u},{day} 09:00:00,{user},PC-{u},Logon");
            let _ = writeln!(file, "F{d}{u},{day} 10:15:00,{user},PC-{u},report.docx");
        }
        let _ = writeln!(logon, "LM{d},{day} 02:00:00,{OUTLIER},PC-9,Logon");
        for k in 0..4 {
            let _ = writeln!(device, "DM{d}{k},{day} 02:1{k}:00,{OUTLIER},PC-9,Connect");
        }
        let _ = writeln!(
            email,
            "EM{d},{day} 02:30:00,{OUTLIER},PC-9,ext@rival.com;x@rival.com,Confidential payroll"
        );
        for k in 0..10 {
            let _ = writeln!(file, "FM{d}{k},{day} 03:0{k}:00,{OUTLIER},PC-9,secret_{k}.pdf");
        }
    }

    write(dir, "logon.csv", &logon);
    write(dir, "device.csv", &device);
    write(dir, "email.csv", &email);
    write(dir, "file.csv", &file);
}

/// Fixture data plus a config pointing at it, with the store inside the same temp dir.
pub fn fixture_config() -> (TempDir, AppConfig) {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    write_fixture(&data);
    let mut config = AppConfig::default();
    config.data_dir = data;
    config.store.path = dir.path().join("store.db");
    (dir, config)
}
