use reqwest::blocking::{multipart, Client};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::info;

use crate::archive::ArchiveSummary;
use crate::config::AppConfig;
use crate::error::Error;

/// Ships a finished archive to the symbol server.
pub trait Uploader {
    fn upload(&self, archive: &ArchiveSummary) -> Result<(), Error>;
}

/// Pick the uploader the configuration describes: HTTP when `upload_url` is
/// set, otherwise SCP when host, user and key are all set.
pub fn from_config(config: &AppConfig, verbose: bool) -> Result<Option<Box<dyn Uploader>>, Error> {
    if let Some(url) = &config.upload_url {
        let token = config.auth_token.clone().ok_or_else(|| {
            Error::Other("upload_url is set but auth_token is missing".to_string())
        })?;
        let uploader = HttpUploader::new(url, &token, config.http_timeout())?;
        return Ok(Some(Box::new(uploader)));
    }

    match (&config.ssh_host, &config.ssh_user, &config.ssh_key) {
        (Some(host), Some(user), Some(key)) => Ok(Some(Box::new(ScpUploader {
            host: host.clone(),
            user: user.clone(),
            key: key.clone(),
            remote_path: config
                .remote_symbol_path
                .clone()
                .unwrap_or_else(|| ".".to_string()),
            post_upload_command: config.post_upload_command.clone(),
            verbose,
        }))),
        _ => Ok(None),
    }
}

/// Multipart `POST` authenticated with an `Auth-Token` header.
pub struct HttpUploader {
    client: Client,
    url: String,
    token: String,
}

impl HttpUploader {
    pub fn new(url: &str, token: &str, timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            token: token.to_string(),
        })
    }
}

impl Uploader for HttpUploader {
    fn upload(&self, archive: &ArchiveSummary) -> Result<(), Error> {
        info!("Uploading {} to {}", archive.path.display(), self.url);
        let form = multipart::Form::new().file("symbols.zip", &archive.path)?;
        let response = self
            .client
            .post(&self.url)
            .header("Auth-Token", &self.token)
            .multipart(form)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upload(format!("{} returned {}", self.url, status)));
        }
        Ok(())
    }
}

/// Copies the archive to `/tmp` on the host with `scp`, then unpacks it into
/// the symbol directory over `ssh`.
pub struct ScpUploader {
    pub host: String,
    pub user: String,
    pub key: PathBuf,
    pub remote_path: String,
    /// Run on the host with the manifest name as its only argument.
    pub post_upload_command: Option<String>,
    pub verbose: bool,
}

impl ScpUploader {
    /// The shell command run on the host for an uploaded `remote_name`.
    pub fn remote_command(&self, remote_name: &str, manifest_name: &str) -> String {
        let mut steps = vec![
            format!("cd {}", shell_quote(&self.remote_path)),
            "umask 002".to_string(),
            format!("unzip -n {}", shell_quote(&format!("/tmp/{}", remote_name))),
        ];
        if let Some(post) = &self.post_upload_command {
            steps.push(format!("{} {}", post, shell_quote(manifest_name)));
        }
        steps.push(format!("rm -v {}", shell_quote(&format!("/tmp/{}", remote_name))));
        steps.join("; ")
    }

    fn run(&self, command: &mut Command) -> Result<(), Error> {
        if !self.verbose {
            command.stdout(Stdio::null());
        }
        let status = command.status()?;
        if !status.success() {
            return Err(Error::Upload(format!("{:?} failed: {}", command, status)));
        }
        Ok(())
    }
}

impl Uploader for ScpUploader {
    fn upload(&self, archive: &ArchiveSummary) -> Result<(), Error> {
        let remote_name = archive
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Other(format!("{} has no file name", archive.path.display())))?;

        info!("Uploading to {}@{}", self.user, self.host);
        self.run(
            Command::new("scp")
                .arg("-i")
                .arg(&self.key)
                .arg(&archive.path)
                .arg(format!("{}@{}:/tmp", self.user, self.host)),
        )?;

        info!("Unpacking to {}", self.remote_path);
        self.run(
            Command::new("ssh")
                .arg("-i")
                .arg(&self.key)
                .arg("-l")
                .arg(&self.user)
                .arg(&self.host)
                .arg(self.remote_command(&remote_name, &archive.manifest_name)),
        )
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scp() -> ScpUploader {
        ScpUploader {
            host: "symbols.example.com".to_string(),
            user: "ted".to_string(),
            key: PathBuf::from("/home/ted/.ssh/id_rsa"),
            remote_path: "/mnt/symbols".to_string(),
            post_upload_command: Some("/usr/local/bin/post-symbol-upload.py".to_string()),
            verbose: false,
        }
    }

    #[test]
    fn test_remote_command() {
        assert_eq!(
            scp().remote_command("symbols.zip", "ossyms-1.0-Darwin-20240101000000-symbols.txt"),
            "cd '/mnt/symbols'; umask 002; unzip -n '/tmp/symbols.zip'; \
             /usr/local/bin/post-symbol-upload.py 'ossyms-1.0-Darwin-20240101000000-symbols.txt'; \
             rm -v '/tmp/symbols.zip'"
        );
    }

    #[test]
    fn test_remote_command_without_hook_quotes_names() {
        let mut uploader = scp();
        uploader.post_upload_command = None;
        assert_eq!(
            uploader.remote_command("it's.zip", "m.txt"),
            r"cd '/mnt/symbols'; umask 002; unzip -n '/tmp/it'\''s.zip'; rm -v '/tmp/it'\''s.zip'"
        );
    }

    #[test]
    fn test_uploader_selection() {
        let config = AppConfig::default();
        assert!(from_config(&config, false).unwrap().is_none());

        let config = AppConfig {
            upload_url: Some("https://symbols.example.com/upload/".to_string()),
            ..AppConfig::default()
        };
        assert!(from_config(&config, false).is_err());

        let config = AppConfig {
            upload_url: Some("https://symbols.example.com/upload/".to_string()),
            auth_token: Some("secret".to_string()),
            ..AppConfig::default()
        };
        assert!(from_config(&config, false).unwrap().is_some());

        let config = AppConfig {
            ssh_host: Some("host".to_string()),
            ssh_user: Some("user".to_string()),
            ssh_key: Some(PathBuf::from("/key")),
            ..AppConfig::default()
        };
        assert!(from_config(&config, false).unwrap().is_some());
    }
}
