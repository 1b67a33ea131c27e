use std::fs::{create_dir_all, read_to_string, write};
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const USERS: &str = "\
user_id,name,gender,age,signup_date,city
U1,Asha,F,30,2024-01-05,Pune
U2,Ravi,M,41,05/02/2024,Delhi
U2,Ravi again,M,41,2024-02-05,Delhi
,Nobody,F,22,2024-01-01,Pune
U3,Mina,F,,not-a-date,Goa
";

const CAPTAINS: &str = "\
captain_id,name,age,experience_years,city,rating
C1,Kiran,35,5,Pune,4.6
C2,Dev,40,8,Delhi,
C3,,29,2,Goa,4.0
";

const RIDES: &str = "\
ride_id,user_id,captain_id,ride_date,pickup_loc,drop_loc,distance_km,duration_min,ride_status
R1,U1,C1,2024-03-02,A,B,10,25,completed
R2,U1,C2,2024-03-20,B,C,4,12,cancelled
R3,U2,C1,2024-03-25,C,D,,30,completed
R4,U9,C1,2024-03-25,C,D,3,9,completed
R5,U3,C2,2024-03-25,D,A,3,9,completed
";

const PAYMENTS: &str = "\
payment_id,ride_id,payment_method,fare,discount_percent,discount_amount,final_amount,payment_status
P1,R1,cash,100,0,0,100,paid
P2,R2,card,50,10,5,45,paid
P3,R3,upi,80,0,0,80,paid
P4,R4,cash,10,0,0,10,paid
";

const FEEDBACK: &str = "\
feedback_id,ride_id,user_rating,captain_rating,issue_category,comments
F1,R1,5,4,late,ok
F2,R2,4,5,late,
F3,R3,3,4,late,fine
F4,R9,1,1,rude,
";

fn write_sources(dir: &Path) {
    create_dir_all(dir).unwrap();
    for (name, body) in [
        ("users.csv", USERS),
        ("captains.csv", CAPTAINS),
        ("rides.csv", RIDES),
        ("payments.csv", PAYMENTS),
        ("feedback.csv", FEEDBACK),
    ] {
        write(dir.join(name), body).unwrap();
    }
}

fn ridewarehouse(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ridewarehouse"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

#[test]
fn full_run_reconciles_cleanly() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("exports");
    let root = tmp.path().join("data");
    write_sources(&source);

    let out = ridewarehouse(&[
        "run",
        "--root",
        root.to_str().unwrap(),
        "--source",
        source.to_str().unwrap(),
        "--as-of",
        "2024-03-26",
        "--fail-on-mismatch",
    ]);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(out.status.success(), "stdout: {stdout}\nstderr: {}", String::from_utf8_lossy(&out.stderr));

    assert!(stdout.contains("INGEST OK entity=users rows_in=5"));
    assert!(stdout.contains("VALIDATE OK entity=users rows_in=5 rows_out=2 rejects=3"));
    assert!(stdout.contains("VALIDATE OK entity=captains rows_in=3 rows_out=2 rejects=1"));
    assert!(stdout.contains("VALIDATE OK entity=rides rows_in=5 rows_out=3 rejects=2"));
    assert!(stdout.contains("VALIDATE OK entity=payments rows_in=4 rows_out=3 rejects=1"));
    assert!(stdout.contains("VALIDATE OK entity=feedback rows_in=4 rows_out=3 rejects=1"));
    assert!(stdout.contains("CURATE OK snapshot_date=2024-03-26 files_written=3 rows_written=7"));
    assert!(stdout.contains("RECONCILE OK metrics=18 mismatches=0"));
    assert!(stdout.contains("DONE in"));

    assert!(root.join("gold/user_aggregate/snapshot_date=2024-03-26/part-000000.parquet").exists());
    assert!(root.join("gold/dashboard_data/snapshot_date=2024-03-26/part-000000.parquet").exists());
    let latest = read_to_string(root.join("manifests/gold/latest.json")).unwrap();
    assert!(latest.contains("2024-03-26"));

    let report = std::fs::read_dir(root.join("reports"))
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.path())
        .find(|p| p.extension().is_some_and(|e| e == "json"))
        .unwrap();
    let report: serde_json::Value = serde_json::from_str(&read_to_string(report).unwrap()).unwrap();
    let metrics = report["metrics"].as_array().unwrap();
    assert_eq!(metrics.len(), 18);
    assert!(metrics.iter().all(|m| m["status"] == "OK"));
    assert!(!root.join(".run.lock").exists());

    // the stages also run one by one against the same warehouse
    let out = ridewarehouse(&["reconcile", "--root", root.to_str().unwrap()]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("RECONCILE OK metrics=18 mismatches=0"));
}

#[test]
fn legacy_dedupe_drops_duplicate_users_without_auditing() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("exports");
    let root = tmp.path().join("data");
    write_sources(&source);
    let root_arg = root.to_str().unwrap();

    let out = ridewarehouse(&["ingest", "--root", root_arg, "--source", source.to_str().unwrap()]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let out = ridewarehouse(&["validate", "--root", root_arg, "--legacy-user-dedupe"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("VALIDATE OK entity=users rows_in=5 rows_out=2 rejects=2"));
}

#[test]
fn missing_bronze_fails_and_releases_the_lock() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("data");

    let out = ridewarehouse(&["validate", "--root", root.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("source for users not found"));
    assert!(!root.join(".run.lock").exists());
}

#[test]
fn ingest_can_be_limited_to_named_entities() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("exports");
    let root = tmp.path().join("data");
    create_dir_all(&source).unwrap();
    write(source.join("captains.csv"), CAPTAINS).unwrap();
    let (root_arg, source_arg) = (root.to_str().unwrap(), source.to_str().unwrap());

    let out = ridewarehouse(&["ingest", "--root", root_arg, "--source", source_arg, "--only", "Captains"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("INGEST OK entity=captains rows_in=3"));
    assert!(!stdout.contains("entity=users"));

    let out = ridewarehouse(&["ingest", "--root", root_arg, "--source", source_arg, "--only", "drivers"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown entity: drivers"));
}
