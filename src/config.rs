use std::path::Path;

use log::debug;

/// Runtime configuration, normally ingested from a `.uconf` file
#[derive(Debug, Clone)]
pub struct Config {
    pub total_size: u64,
    pub header_size: u64,
    pub block_size: u64,
    pub max_files: u32,
    pub max_filename_length: u32,
    pub max_users: u32,
    pub admin_username: String,
    pub admin_password: String,
    pub require_auth: bool,
    pub max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            total_size: 100 * 1024 * 1024,
            header_size: 512,
            block_size: 4096,
            max_files: 1000,
            max_filename_length: 255,
            max_users: 50,
            admin_username: "admin".to_owned(),
            admin_password: "admin123".to_owned(),
            require_auth: true,
            max_connections: 20,
        }
    }
}

impl Config {
    /// Parse a `.uconf` file, falling back to defaults for anything absent
    /// Sections: `[filesystem]`, `[security]`, `[server]`
    pub fn load(path: &Path) -> Self {
        let mut config = Self::default();
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return config,
        };
        let mut section = String::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].trim().to_owned();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let mut value = value.trim();
            if let Some(comment) = value.find('#') {
                value = value[..comment].trim();
            }
            if !config.apply(&section, key, value) {
                debug!("Ignoring config key {section}.{key}");
            }
        }
        config
    }

    fn apply(&mut self, section: &str, key: &str, value: &str) -> bool {
        match (section, key) {
            ("filesystem", "total_size") => set_u64(&mut self.total_size, value),
            ("filesystem", "header_size") => set_u64(&mut self.header_size, value),
            ("filesystem", "block_size") => set_u64(&mut self.block_size, value),
            ("filesystem", "max_files") => set_u32(&mut self.max_files, value),
            ("filesystem", "max_filename_length") => {
                set_u32(&mut self.max_filename_length, value)
            }
            ("security", "max_users") => set_u32(&mut self.max_users, value),
            ("security", "admin_username") => {
                self.admin_username = unquote(value).to_owned();
                true
            }
            ("security", "admin_password") => {
                self.admin_password = unquote(value).to_owned();
                true
            }
            ("security", "require_auth") => {
                self.require_auth = parse_bool(value);
                true
            }
            ("server", "max_connections") => set_u32(&mut self.max_connections, value),
            _ => false,
        }
    }
}

fn set_u64(field: &mut u64, value: &str) -> bool {
    match value.parse() {
        Ok(v) => {
            *field = v;
            true
        }
        Err(_) => false,
    }
}

fn set_u32(field: &mut u32, value: &str) -> bool {
    match value.parse() {
        Ok(v) => {
            *field = v;
            true
        }
        Err(_) => false,
    }
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::Config;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.total_size, 104_857_600);
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.max_files, 1000);
        assert_eq!(config.max_filename_length, 255);
        assert_eq!(config.max_users, 50);
        assert_eq!(config.admin_username, "admin");
        assert_eq!(config.admin_password, "admin123");
        assert!(config.require_auth);
        assert_eq!(config.max_connections, 20);
    }

    #[test]
    fn parse_sections_and_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "# OMNIFS config\n\
             [filesystem]\n\
             total_size = 10485760\n\
             block_size = 512  # small blocks\n\
             \n\
             [security]\n\
             admin_username = \"root\"\n\
             admin_password = 'secret'\n\
             require_auth = no\n\
             ; trailing comment\n\
             [server]\n\
             max_connections = 4\n\
             unknown_key = 99"
        )
        .unwrap();
        let config = Config::load(file.path());
        assert_eq!(config.total_size, 10_485_760);
        assert_eq!(config.block_size, 512);
        assert_eq!(config.admin_username, "root");
        assert_eq!(config.admin_password, "secret");
        assert!(!config.require_auth);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.max_files, 1000);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(std::path::Path::new("/nonexistent/omnifs.uconf"));
        assert_eq!(config.max_users, 50);
    }
}
