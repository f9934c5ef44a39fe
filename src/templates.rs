//! Literal configuration files written by the installer and the site
//! workflow.
use std::path::Path;

use crate::constants::php_cgi_binary;

/// Renders a path with forward slashes, as httpd expects.
pub fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(windows)]
const SYSTEM_ENV: &str = r#"FcgidInitialEnv SystemRoot "C:\\Windows"
FcgidInitialEnv SystemDrive "C:"
FcgidInitialEnv TEMP "C:\\WINDOWS\\TEMP"
FcgidInitialEnv TMP "C:\\WINDOWS\\TEMP"
FcgidInitialEnv windir "C:\\WINDOWS"
"#;

#[cfg(not(windows))]
const SYSTEM_ENV: &str = "FcgidInitialEnv TMPDIR \"/tmp\"\n";

#[cfg(windows)]
fn search_path(php_dir: &str) -> String {
    let native = php_dir.replace('/', "\\\\");
    format!("{native};C:\\\\WINDOWS\\\\system32;C:\\\\WINDOWS;C:\\\\WINDOWS\\\\System32\\\\Wbem;")
}

#[cfg(not(windows))]
fn search_path(php_dir: &str) -> String {
    format!("{php_dir}:/usr/local/bin:/usr/bin:/bin")
}

/// `conf/extra/httpd-fcgid.conf`: routes `.php` requests to the runtime's
/// FastCGI binary.
pub fn fcgid_conf(php_dir: &Path) -> String {
    let php = normalize(php_dir);
    let cgi = php_cgi_binary();
    let path = search_path(&php);
    format!(
        r#"
FcgidInitialEnv PATH "{path}"
{SYSTEM_ENV}FcgidInitialEnv PHPRC "{php}"

# ---------------------------
# Process Management
# ---------------------------
FcgidMaxProcesses 100
FcgidMaxRequestsPerProcess 1000
FcgidMinProcessesPerClass 0
FcgidProcessLifeTime 900

# ---------------------------
# Request and Buffer Limits
# ---------------------------
FcgidMaxRequestLen 268435456
FcgidOutputBufferSize 65536

# ---------------------------
# Timeouts
# ---------------------------
FcgidIOTimeout 210
FcgidConnectTimeout 120
FcgidBusyTimeout 120
FcgidIdleTimeout 300
FcgidBusyScanInterval 120
FcgidErrorScanInterval 120
FcgidIdleScanInterval 120
FcgidZombieScanInterval 120

# ---------------------------
# PHP FastCGI Settings
# ---------------------------
FcgidInitialEnv PHP_FCGI_CHILDREN 0
FcgidInitialEnv PHP_FCGI_MAX_REQUESTS 0

# ---------------------------
# PHP File Handler
# ---------------------------
<Files ~ "\.php$">
  Options ExecCGI SymLinksIfOwnerMatch
  AddHandler fcgid-script .php
  FcgidWrapper "{php}/{cgi}" .php
</Files>
"#
    )
}

/// `conf/extra/httpd-ssl.conf`: global TLS defaults.
pub const SSL_CONF: &str = r#"
#
# Apache server configuration providing SSL support.
# See <URL:http://httpd.apache.org/docs/2.4/mod/mod_ssl.html>
#
# Required modules: mod_log_config, mod_setenvif, mod_ssl,
#          socache_shmcb_module (for default value of SSLSessionCache)

Listen 443

##
##  SSL Global Context
##

SSLCipherSuite HIGH:MEDIUM:!MD5:!RC4:!3DES
SSLProxyCipherSuite HIGH:MEDIUM:!MD5:!RC4:!3DES

SSLHonorCipherOrder on

SSLProtocol all -SSLv3
SSLProxyProtocol all -SSLv3

SSLPassPhraseDialog  builtin

#SSLSessionCache         "dbm:${SRVROOT}/logs/ssl_scache"
SSLSessionCache        "shmcb:${SRVROOT}/logs/ssl_scache(512000)"
SSLSessionCacheTimeout  300

#SSLUseStapling On
#SSLStaplingCache "shmcb:${SRVROOT}/logs/ssl_stapling(32768)"
#SSLStaplingStandardCacheTimeout 3600
#SSLStaplingErrorCacheTimeout 600
"#;

/// Line appended to `httpd.conf` so every site fragment is loaded.
pub fn include_sites(sites_enabled: &Path) -> String {
    format!("\n\nIncludeOptional {}/*.conf\n", normalize(sites_enabled))
}

/// Certificate material referenced by an HTTPS virtual host.
#[derive(Debug, Clone, Copy)]
pub struct TlsFiles<'a> {
    pub cert: &'a Path,
    pub key: &'a Path,
}

/// Per-site vhost fragment. The HTTPS block is added when `tls` is given.
pub fn vhost(doc_root: &Path, site: &str, php_dir: &Path, tls: Option<TlsFiles<'_>>) -> String {
    let mut out = format!(
        "\ndefine ROOT \"{}\"\ndefine DOMAIN \"{site}\"\ndefine PHPRC_PATH \"{}\"\n",
        normalize(doc_root),
        normalize(php_dir)
    );

    out.push_str(&virtual_host("*:80", None));
    if let Some(tls) = tls {
        out.push_str("\n\n");
        out.push_str(&virtual_host("*:443", Some(tls)));
    }
    out
}

fn virtual_host(address: &str, tls: Option<TlsFiles<'_>>) -> String {
    let ssl = tls
        .map(|tls| {
            format!(
                "\n    SSLEngine On\n    SSLCertificateFile \"{}\"\n    SSLCertificateKeyFile \"{}\"\n",
                normalize(tls.cert),
                normalize(tls.key)
            )
        })
        .unwrap_or_default();
    let cgi = php_cgi_binary();

    format!(
        r#"
<VirtualHost {address}>
    DocumentRoot "${{ROOT}}"
    ServerName ${{DOMAIN}}
    ServerAlias www.${{DOMAIN}}
    ErrorLog logs/${{DOMAIN}}-error.log
    CustomLog logs/${{DOMAIN}}-access.log common
{ssl}
    <Directory "${{ROOT}}">
        AllowOverride All
        Require all granted

        DirectoryIndex index.php
    </Directory>

    FcgidInitialEnv PHPRC "${{PHPRC_PATH}}"

    <Files ~ "\.php$">
        AddHandler fcgid-script .php
        FcgidWrapper "${{PHPRC_PATH}}/{cgi}" .php
    </Files>
</VirtualHost>
"#
    )
}
