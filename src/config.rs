use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
}

/// 生成产物存储与发布配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// 生成图片的落盘目录（进程启动时自动创建）
    #[serde(default = "AssetsConfig::default_output_dir")]
    pub output_dir: String,
    /// 拼接 ogImageUrl 用的对外基地址（不含路径，结尾斜杠会被忽略）
    #[serde(default = "AssetsConfig::default_public_base_url")]
    pub public_base_url: String,
}

impl AssetsConfig {
    fn default_output_dir() -> String {
        "./og-images".to_string()
    }
    fn default_public_base_url() -> String {
        "http://localhost:3001".to_string()
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            output_dir: Self::default_output_dir(),
            public_base_url: Self::default_public_base_url(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（RUST_LOG 未设置时的默认值）
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// CORS 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// 是否启用 CORS
    #[serde(default = "CorsConfig::default_enabled")]
    pub enabled: bool,
    /// 允许的 Origin 列表（支持 "*" 表示任意）
    #[serde(default = "CorsConfig::default_any")]
    pub allowed_origins: Vec<String>,
    /// 允许的方法列表（支持 "*" 表示任意）
    #[serde(default = "CorsConfig::default_any")]
    pub allowed_methods: Vec<String>,
    /// 允许的请求头列表（支持 "*" 表示任意）
    #[serde(default = "CorsConfig::default_any")]
    pub allowed_headers: Vec<String>,
    /// 是否允许携带凭证（Cookie/Authorization）；不能与 "*" 同时使用
    #[serde(default)]
    pub allow_credentials: bool,
}

impl CorsConfig {
    fn default_enabled() -> bool {
        true
    }
    fn default_any() -> Vec<String> {
        vec!["*".to_string()]
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            allowed_origins: Self::default_any(),
            allowed_methods: Self::default_any(),
            allowed_headers: Self::default_any(),
            allow_credentials: false,
        }
    }
}

/// 品牌标识配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandingConfig {
    /// 画布右下角的品牌文字
    #[serde(default = "BrandingConfig::default_text")]
    pub text: String,
}

impl BrandingConfig {
    fn default_text() -> String {
        "#reactdeveloper".to_string()
    }
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            text: Self::default_text(),
        }
    }
}

/// 图片合成配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// 是否优先速度渲染（OptimizeSpeed），提升栅格化性能，可能略降画质
    #[serde(default)]
    pub optimize_speed: bool,
    /// 并发合成许可数（0=自动，取 CPU 核心数）
    #[serde(default)]
    pub max_parallel: u32,
    /// 上传图片的最大字节数（解码前检查，防止解码阶段内存失控）
    #[serde(default = "RenderConfig::default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// 单次合成的最长处理时间（秒）
    #[serde(default = "RenderConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl RenderConfig {
    fn default_max_upload_bytes() -> u64 {
        8 * 1024 * 1024
    }
    fn default_timeout() -> u64 {
        30
    }

    /// 请求体上限：在图片上限之上留出文本字段与 multipart 包装的余量
    pub fn body_limit_bytes(&self) -> usize {
        (self.max_upload_bytes as usize).saturating_add(256 * 1024)
    }

    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            optimize_speed: false,
            max_parallel: 0,
            max_upload_bytes: Self::default_max_upload_bytes(),
            timeout_secs: Self::default_timeout(),
        }
    }
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 优雅退出超时时间（秒），超时后强制结束进程
    #[serde(default = "ShutdownConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl ShutdownConfig {
    fn default_timeout() -> u64 {
        30
    }

    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "AppConfig::default_server")]
    pub server: ServerConfig,
    /// 产物存储与发布配置
    #[serde(default)]
    pub assets: AssetsConfig,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
    /// CORS 配置
    #[serde(default)]
    pub cors: CorsConfig,
    /// 品牌标识配置
    #[serde(default)]
    pub branding: BrandingConfig,
    /// 图片合成配置
    #[serde(default)]
    pub render: RenderConfig,
    /// 优雅退出配置
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖
    ///
    /// `config.toml` 可以不存在，此时全部字段取默认值；任何字段都可以用
    /// `APP_` 前缀的环境变量覆盖，例如 `APP_SERVER_PORT=8080`。
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();

        tracing::info!("正在从 {:?} 加载配置文件（允许缺失）", config_path);

        let builder = ConfigBuilder::builder()
            .add_source(File::from(config_path).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?;

        builder.try_deserialize()
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<(), ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(())
    }

    /// 获取配置文件路径
    fn get_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 获取生成图片的落盘目录
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.assets.output_dir)
    }

    fn default_server() -> ServerConfig {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 3001,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: Self::default_server(),
            assets: AssetsConfig::default(),
            logging: LoggingConfig::default(),
            cors: CorsConfig::default(),
            branding: BrandingConfig::default(),
            render: RenderConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}
