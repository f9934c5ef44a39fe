#![allow(dead_code)]

use std::{
    cell::RefCell,
    collections::HashMap,
    fs::{self, File},
    io::Write,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use sysinfo::{Pid, ProcessesToUpdate, System};
use wamp::{
    constants::{
        APACHE_ARCHIVE_WRAPPER, COMPOSER_URL, FCGID_MODULE_FILE, HOSTSRW_URL, MKCERT_URL,
        ServiceKind, mariadb_install_db_binary,
    },
    download::Fetcher,
    error::StackError,
    install::{httpd, mariadb, php},
    runtime::StackLayout,
};
use zip::{ZipWriter, write::FileOptions};

/// Stock `httpd.conf` lines the installer is expected to patch.
pub const STOCK_HTTPD_CONF: &str = "Define SRVROOT \"c:/Apache24\"\n\
ServerRoot \"${SRVROOT}\"\n\
Listen 80\n\
#LoadModule access_compat_module modules/mod_access_compat.so\n\
#LoadModule rewrite_module modules/mod_rewrite.so\n\
#LoadModule socache_shmcb_module modules/mod_socache_shmcb.so\n\
#LoadModule ssl_module modules/mod_ssl.so\n\
LoadModule log_config_module modules/mod_log_config.so\n\
LoadModule setenvif_module modules/mod_setenvif.so\n\
#ServerName www.example.com:80\n\
#Include conf/extra/httpd-ssl.conf\n";

/// One entry of a fixture archive.
pub struct Entry<'a> {
    pub name: &'a str,
    pub body: &'a [u8],
    pub executable: bool,
}

impl<'a> Entry<'a> {
    pub fn file(name: &'a str, body: &'a str) -> Self {
        Self {
            name,
            body: body.as_bytes(),
            executable: false,
        }
    }

    pub fn script(name: &'a str, body: &'a str) -> Self {
        Self {
            name,
            body: body.as_bytes(),
            executable: true,
        }
    }
}

pub fn write_zip(path: &Path, entries: &[Entry<'_>]) {
    let file = File::create(path).expect("failed to create zip");
    let mut writer = ZipWriter::new(file);
    for entry in entries {
        let mode = if entry.executable { 0o755 } else { 0o644 };
        let options = FileOptions::default().unix_permissions(mode);
        writer
            .start_file(entry.name, options)
            .expect("failed to start zip entry");
        writer.write_all(entry.body).expect("failed to write zip entry");
    }
    writer.finish().expect("failed to finish zip");
}

pub fn write_script(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create script dir");
    }
    fs::write(path, format!("#!/bin/sh\n{body}\n")).expect("failed to write script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .expect("failed to mark script executable");
}

/// Serves artifacts from local files keyed by URL, and records every request.
#[derive(Default)]
pub struct MirrorFetcher {
    files: HashMap<String, PathBuf>,
    requests: RefCell<Vec<String>>,
}

impl MirrorFetcher {
    pub fn with(mut self, url: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        self.files.insert(url.into(), file.into());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl Fetcher for MirrorFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), StackError> {
        self.requests.borrow_mut().push(url.to_string());
        match self.files.get(url) {
            Some(source) => fs::copy(source, dest)
                .map(|_| ())
                .map_err(StackError::io(dest)),
            None => Err(StackError::DownloadStatus {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Vendor archives for a whole stack, built under `dir`.
pub struct Mirror {
    pub dir: PathBuf,
}

impl Mirror {
    pub fn new(dir: &Path) -> Self {
        let dir = dir.join("mirror");
        fs::create_dir_all(&dir).expect("failed to create mirror dir");
        Self { dir }
    }

    pub fn php(&self, version: &str) -> PathBuf {
        let path = self.dir.join(format!("{version}.zip"));
        write_zip(
            &path,
            &[
                Entry::file(
                    "php.ini-development",
                    "[PHP]\nmemory_limit = 128M\n; On windows:\n;extension_dir = \"ext\"\n",
                ),
                Entry::file("ext/php_openssl.dll", "dll"),
                Entry::script("php-cgi", "#!/bin/sh\nexit 0\n"),
            ],
        );
        path
    }

    pub fn apache(&self, version: &str) -> PathBuf {
        let path = self.dir.join(format!("{version}.zip"));
        let conf = format!("{APACHE_ARCHIVE_WRAPPER}/conf/httpd.conf");
        let binary = format!("{APACHE_ARCHIVE_WRAPPER}/bin/httpd");
        let module = format!("{APACHE_ARCHIVE_WRAPPER}/modules/mod_ssl.so");
        write_zip(
            &path,
            &[
                Entry::file(&conf, STOCK_HTTPD_CONF),
                Entry::script(&binary, "#!/bin/sh\nexec sleep 30\n"),
                Entry::file(&module, "so"),
                Entry::file("ReadMe.txt", "readme"),
            ],
        );
        path
    }

    pub fn fcgid(&self) -> PathBuf {
        let path = self.dir.join("mod_fcgid.zip");
        write_zip(
            &path,
            &[
                Entry::file(FCGID_MODULE_FILE, "fcgid"),
                Entry::file("ReadMe.txt", "readme"),
            ],
        );
        path
    }

    /// Database archive whose init helper creates a marker in its data dir.
    pub fn mariadb(&self, version: &str) -> PathBuf {
        self.mariadb_with_init(version, "for arg in \"$@\"; do\n  case \"$arg\" in\n    --datadir=*) touch \"${arg#--datadir=}/ibdata1\" ;;\n  esac\ndone")
    }

    pub fn mariadb_with_init(&self, version: &str, init_body: &str) -> PathBuf {
        let path = self.dir.join(format!("{version}.zip"));
        let init = format!("{version}/bin/{}", mariadb_install_db_binary());
        let server = format!("{version}/bin/mariadbd");
        let init_script = format!("#!/bin/sh\n{init_body}\n");
        write_zip(
            &path,
            &[
                Entry::script(&init, &init_script),
                Entry::script(&server, "#!/bin/sh\nexec sleep 30\n"),
                Entry::file(&format!("{version}/share/errmsg.sys"), "msg"),
            ],
        );
        path
    }

    /// Helper tools. The certificate tool logs its arguments to `log`.
    pub fn tools(&self, log: &Path) -> (PathBuf, PathBuf, PathBuf) {
        let mkcert = self.dir.join("mkcert");
        write_script(
            &mkcert,
            &format!(
                "printf '%s\\n' \"$*\" >> \"{}\"\ncase \"$1\" in\n  -*) ;;\n  *) touch \"./$1.pem\" \"./$1-key.pem\" ;;\nesac",
                log.display()
            ),
        );
        let hostsrw = self.dir.join("hostsrw");
        write_script(&hostsrw, "exit 0");
        let composer = self.dir.join("composer.phar");
        fs::write(&composer, "<?php").expect("failed to write composer");
        (mkcert, hostsrw, composer)
    }

    /// Fetcher serving every bundle of a default stack.
    pub fn full_stack_fetcher(
        &self,
        php_version: &str,
        apache_version: &str,
        mariadb_version: &str,
        tool_log: &Path,
    ) -> MirrorFetcher {
        let (mkcert, hostsrw, composer) = self.tools(tool_log);
        MirrorFetcher::default()
            .with(php::bundle(php_version).url, self.php(php_version))
            .with(httpd::bundle(apache_version).url, self.apache(apache_version))
            .with(httpd::fcgid_bundle().url, self.fcgid())
            .with(mariadb::bundle(mariadb_version).url, self.mariadb(mariadb_version))
            .with(MKCERT_URL, mkcert)
            .with(HOSTSRW_URL, hostsrw)
            .with(COMPOSER_URL, composer)
    }
}

/// Stack directory with `wamp.ini` selecting `apache`/`mysql` versions and
/// the given install directories present.
pub fn stack_layout(root: &Path, apache: &str, mysql: &str) -> StackLayout {
    let layout = StackLayout::new(root);
    fs::create_dir_all(layout.install_dir(ServiceKind::Apache, apache))
        .expect("failed to create apache dir");
    fs::create_dir_all(layout.install_dir(ServiceKind::MariaDb, mysql))
        .expect("failed to create mysql dir");
    fs::create_dir_all(layout.tmp_dir()).expect("failed to create tmp dir");
    fs::write(
        layout.config_path(),
        format!("[apache]\nactive={apache}\n[mysql]\nactive={mysql}\n"),
    )
    .expect("failed to write wamp.ini");
    layout
}

pub fn wait_for_path(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if path.exists() {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }
    panic!("Timed out waiting for {:?} to exist", path);
}

#[cfg(target_os = "linux")]
pub fn wait_for_process_exit(pid: u32) {
    let deadline = Instant::now() + Duration::from_secs(10);
    let proc_path = PathBuf::from(format!("/proc/{pid}"));
    let stat_path = proc_path.join("stat");

    while Instant::now() < deadline {
        if !proc_path.exists() {
            return;
        }

        // Killed children of the test process linger as zombies.
        if let Ok(stat) = fs::read_to_string(&stat_path)
            && let Some(state_start) = stat.rfind(')')
            && let Some(state) = stat[state_start + 1..].trim().chars().next()
            && (state == 'Z' || state == 'X')
        {
            return;
        }

        thread::sleep(Duration::from_millis(100));
    }

    panic!("Timed out waiting for PID {pid} to exit");
}

pub fn is_process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system.process(Pid::from_u32(pid)).is_some()
}

/// PID of a process that has already exited and been reaped.
pub fn dead_pid() -> u32 {
    let mut child = std::process::Command::new("true")
        .spawn()
        .expect("failed to spawn true");
    let pid = child.id();
    child.wait().expect("failed to wait for true");
    pid
}
