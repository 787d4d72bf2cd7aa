#![allow(dead_code)]

use std::path::Path;

use config::Config;
use error::Error;
use ops::OmniFs;
use structs::UserRole;

mod config;
mod error;
mod filesystem;
mod ops;
mod structs;

fn prompt(separator: &str) -> Option<Vec<String>> {
    use std::io::Write;
    let mut line = String::new();
    print!("{separator}");
    std::io::stdout().flush().ok()?;
    match std::io::stdin().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(
            line.trim()
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        ),
        Err(_) => None,
    }
}

struct Shell {
    ofs: OmniFs,
    session: Option<String>,
    username: String,
}

impl Shell {
    fn session(&self) -> Result<&str, Error> {
        self.session.as_deref().ok_or(Error::InvalidSession)
    }

    fn execute(&mut self, cmd: &[String]) -> Result<(), Error> {
        let arg = |i: usize| cmd.get(i).map(String::as_str).ok_or(Error::InvalidOperation);
        match cmd[0].as_str() {
            "init" => self.ofs.init(Path::new(arg(1)?)),
            "format" => {
                if self.ofs.is_mounted() {
                    println!("File system is currently initialized, shutdown first");
                    return Ok(());
                }
                self.ofs.format(Path::new(arg(1)?))
            }
            "shutdown" => {
                self.session = None;
                self.username.clear();
                self.ofs.shutdown()
            }
            "login" => {
                let id = self.ofs.login(arg(1)?, arg(2)?)?;
                self.username = arg(1)?.to_owned();
                self.session = Some(id);
                println!("Welcome, {}", self.username);
                Ok(())
            }
            "logout" => {
                let id = self.session()?.to_owned();
                self.ofs.logout(&id)?;
                println!("Goodbye, {}", self.username);
                self.session = None;
                self.username.clear();
                Ok(())
            }
            "whoami" => {
                let id = self.session()?.to_owned();
                let info = self.ofs.session_info(&id)?;
                println!("Session: {}", info.session_id);
                println!("User: {} ({:?})", info.username, info.role);
                println!("Login time: {}", info.login_time);
                println!("Last activity: {}", info.last_activity);
                println!("Operations: {}", info.operations_count);
                Ok(())
            }
            "useradd" => {
                let role = match cmd.get(3).map(String::as_str) {
                    Some("admin") => UserRole::Admin,
                    _ => UserRole::Normal,
                };
                let id = self.session()?.to_owned();
                self.ofs.user_create(&id, arg(1)?, arg(2)?, role)
            }
            "userdel" => {
                let id = self.session()?.to_owned();
                self.ofs.user_delete(&id, arg(1)?)
            }
            "users" => {
                let id = self.session()?.to_owned();
                for user in self.ofs.user_list(&id)? {
                    println!("  {} ({:?})", user.username, user.role);
                }
                Ok(())
            }
            "create" => {
                let id = self.session()?.to_owned();
                let path = arg(1)?.to_owned();
                let data = cmd.get(2..).unwrap_or_default().join(" ");
                self.ofs.file_create(&id, &path, data.as_bytes())
            }
            "cat" => {
                let id = self.session()?.to_owned();
                let data = self.ofs.file_read(&id, arg(1)?)?;
                println!("{}", String::from_utf8_lossy(&data));
                Ok(())
            }
            "rm" => {
                let id = self.session()?.to_owned();
                self.ofs.file_delete(&id, arg(1)?)
            }
            "mv" => {
                let id = self.session()?.to_owned();
                self.ofs.file_rename(&id, arg(1)?, arg(2)?)
            }
            "edit" => {
                let id = self.session()?.to_owned();
                let path = arg(1)?.to_owned();
                let index: u64 = arg(2)?.parse().map_err(|_| Error::InvalidOperation)?;
                let data = cmd.get(3..).unwrap_or_default().join(" ");
                self.ofs.file_edit(&id, &path, data.as_bytes(), index)
            }
            "truncate" => {
                let id = self.session()?.to_owned();
                self.ofs.file_truncate(&id, arg(1)?)
            }
            "mkdir" => {
                let id = self.session()?.to_owned();
                self.ofs.dir_create(&id, arg(1)?)
            }
            "ls" => {
                let id = self.session()?.to_owned();
                let path = cmd.get(1).map(String::as_str).unwrap_or("/");
                let entries = self.ofs.dir_list(&id, path)?;
                if entries.is_empty() {
                    println!("  (empty)");
                }
                for entry in entries {
                    let marker = match entry.kind() {
                        structs::EntryKind::Directory => "->",
                        structs::EntryKind::File => " -",
                    };
                    println!("  {marker} {}", entry.name().unwrap_or_default());
                }
                Ok(())
            }
            "rmdir" => {
                let id = self.session()?.to_owned();
                self.ofs.dir_delete(&id, arg(1)?)
            }
            "stat" => {
                let id = self.session()?.to_owned();
                let meta = self.ofs.get_metadata(&id, arg(1)?)?;
                println!("Name: {}", meta.entry.name().unwrap_or_default());
                println!("Type: {:?}", meta.entry.kind());
                println!("Size: {} bytes", meta.entry.size);
                println!("Permissions: {:o}", meta.entry.permissions);
                println!("Owner: {}", meta.entry.owner().unwrap_or_default());
                println!("Created: {}", meta.entry.created_time);
                println!("Modified: {}", meta.entry.modified_time);
                println!("Blocks used: {}", meta.blocks_used);
                println!("Actual size: {} bytes", meta.actual_size);
                Ok(())
            }
            "chmod" => {
                let id = self.session()?.to_owned();
                let permissions = u32::from_str_radix(arg(2)?, 8)
                    .map_err(|_| Error::InvalidOperation)?;
                self.ofs.set_permissions(&id, arg(1)?, permissions)
            }
            "stats" => {
                let id = self.session()?.to_owned();
                let stats = self.ofs.get_stats(&id)?;
                println!("Total size: {} bytes", stats.total_size);
                println!("Used space: {} bytes", stats.used_space);
                println!("Free space: {} bytes", stats.free_space);
                println!("Files: {}", stats.total_files);
                println!("Directories: {}", stats.total_directories);
                println!("Users: {}", stats.total_users);
                println!("Active sessions: {}", stats.active_sessions);
                println!("Fragmentation: {:.2}%", stats.fragmentation);
                Ok(())
            }
            "help" => {
                println!("System:    init <path.omni> | format <path.omni> | shutdown");
                println!("Users:     login <user> <pass> | logout | whoami");
                println!("           useradd <user> <pass> [admin] | userdel <user> | users");
                println!("Files:     create <path> [content] | cat <path> | rm <path>");
                println!("           mv <old> <new> | edit <path> <index> [content]");
                println!("           truncate <path>");
                println!("Dirs:      mkdir <path> | ls [path] | rmdir <path>");
                println!("Info:      stat <path> | chmod <path> <octal> | stats");
                Ok(())
            }
            other => {
                println!("Unknown command: {other} (try help)");
                Ok(())
            }
        }
    }
}

fn main() {
    env_logger::init();
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(Path::new(&path)),
        None => Config::default(),
    };
    let mut shell = Shell {
        ofs: OmniFs::new(config),
        session: None,
        username: String::new(),
    };
    loop {
        let Some(cmd) = prompt(">> ") else { break };
        if cmd.is_empty() {
            continue;
        }
        if cmd[0] == "exit" || cmd[0] == "quit" {
            break;
        }
        if let Err(e) = shell.execute(&cmd) {
            println!("ERROR: {e} (code: {})", e.code());
        }
    }
    if shell.ofs.is_mounted() {
        if let Some(id) = shell.session.take() {
            let _ = shell.ofs.logout(&id);
        }
        if let Err(e) = shell.ofs.shutdown() {
            eprintln!("Shutdown failed: {e}");
        }
    }
}
