#![cfg(not(tarpaulin_include))]

use labgroups::admin::{GroupFilter, delete_group, filter_groups};
use labgroups::auth::hash_password;
use labgroups::config::Config;
use labgroups::downloader::{groups_to_csv, groups_to_xlsx};
use labgroups::eligibility::GroupRequest;
use labgroups::ledger::load_groups;
use labgroups::loader::import_csv;
use labgroups::model::Identity;
use labgroups::notify::LogNotifier;
use labgroups::roster::Roster;
use labgroups::saving::WorkbookStore;
use labgroups::writer::GroupWriter;

use std::env;
use std::fs;

const USAGE: &str = "\
Usage: labgroups <command> [args]

Commands:
  import <table> <file.csv> [--replace]   Load a CSV file into a table
  groups [course]                         List groups, optionally for one course
  export <out.csv|out.xlsx> [course]      Export groups
  create <admin-email> <course> <name> <member>...
                                          Create a group on behalf of students
  delete <course> <name>                  Delete a group
  hash-password <password>                Print an argon2 hash for Login_details";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    if command == "hash-password" {
        let Some(password) = args.get(1) else {
            eprintln!("{}", USAGE);
            return Ok(());
        };
        println!("{}", hash_password(password)?);
        return Ok(());
    }

    let config = Config::from_env()?;
    let retry = config.retry_policy();
    let store = WorkbookStore::open(config.workbook_path())?;

    match (command.as_str(), &args[1..]) {
        ("import", [table, file, rest @ ..]) => {
            let replace = rest.iter().any(|a| a == "--replace");
            let count = import_csv(&store, table, file, replace)?;
            println!("imported {} row(s) into '{}'", count, table);
        }
        ("groups", rest) => {
            let filter = GroupFilter {
                course: rest.first().cloned(),
                ..Default::default()
            };
            let table = load_groups(&store, &retry)?;
            for group in filter_groups(&table.groups, &filter) {
                println!(
                    "{} | {} | {} member(s) | created by {}",
                    group.course,
                    group.name,
                    group.members.len(),
                    group.created_by
                );
            }
        }
        ("export", [out, rest @ ..]) => {
            let filter = GroupFilter {
                course: rest.first().cloned(),
                ..Default::default()
            };
            let table = load_groups(&store, &retry)?;
            let groups = filter_groups(&table.groups, &filter);
            if out.to_lowercase().ends_with(".xlsx") {
                fs::write(out, groups_to_xlsx(groups.iter().copied())?)?;
            } else {
                fs::write(out, groups_to_csv(groups.iter().copied()))?;
            }
            println!("exported {} group(s) to {}", groups.len(), out);
        }
        ("create", [admin, course, name, members @ ..]) => {
            let roster = Roster::load(&store, &retry)?;
            let request = GroupRequest {
                requester: Identity::admin(admin),
                course: course.clone(),
                faculty: String::new(),
                department: String::new(),
                name: name.clone(),
                members: members.to_vec(),
            };
            let report = GroupWriter::new(&store, &LogNotifier, &roster, retry).create(&request)?;
            for warning in &report.warnings {
                eprintln!("warning: {}", warning);
            }
            if report.is_partial_failure() {
                for failure in &report.failed_notifications {
                    eprintln!("warning: {} was not notified", failure.recipient);
                }
            }
            println!(
                "created '{}' for {} with {} member(s)",
                report.group.name,
                report.group.course,
                report.group.members.len()
            );
        }
        ("delete", [course, name]) => {
            let removed = delete_group(&store, &retry, course, name)?;
            println!("deleted '{}' for {}", removed.name, removed.course);
        }
        _ => eprintln!("{}", USAGE),
    }

    Ok(())
}
