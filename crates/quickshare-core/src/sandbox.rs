//! 路径沙箱
//!
//! 把不可信的请求路径解析为共享根目录之下的真实路径。
//!
//! # 解析步骤
//!
//! 1. 去掉查询串和片段
//! 2. 百分号解码两次，每一次前后都检查 `..`
//! 3. 反斜杠统一为 `/`，去掉前导 `/`，空片段表示根目录
//! 4. 拼接到根目录后做 `canonicalize`（展开符号链接，同时要求路径存在）
//! 5. 根目录自身也 `canonicalize`，再按路径分量判断包含关系
//!
//! 任何一步失败都返回同一个 [`AccessDenied`]。
//!
//! 解码只做两轮：三重编码的 `..` 在第二轮之后仍是 `%2e`，拼接后不会被文件系统
//! 当作上级目录，结果只会是不存在的路径。

use crate::error::AccessDenied;
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// 解析成功的路径
///
/// 只在解析那一刻保证位于根目录之内，不应跨请求缓存。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    path: PathBuf,
    root: PathBuf,
}

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// 解析时使用的（已规范化的）根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_root(&self) -> bool {
        self.path == self.root
    }

    /// 相对根目录的显示路径，例如 `/` 或 `/docs/a.txt`
    pub fn relative_display(&self) -> String {
        let rel = self.path.strip_prefix(&self.root).unwrap_or(Path::new(""));
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        format!("/{}", parts.join("/"))
    }

    /// 文件名（根目录时为根目录名）
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "share".to_string())
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }
}

/// 路径沙箱
#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
    allowed_name: Option<String>,
}

impl PathSandbox {
    /// 目录共享：根目录下任何存在的路径都可访问
    pub fn for_directory(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allowed_name: None,
        }
    }

    /// 单文件共享：根目录为文件所在目录，只允许访问这一个文件名
    pub fn for_file(file: &Path) -> Result<Self, AccessDenied> {
        let root = file.parent().ok_or(AccessDenied)?;
        let name = file.file_name().ok_or(AccessDenied)?;
        Ok(Self {
            root: root.to_path_buf(),
            allowed_name: Some(name.to_string_lossy().to_string()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn allowed_name(&self) -> Option<&str> {
        self.allowed_name.as_deref()
    }

    /// 根据共享模式解析请求路径
    pub fn resolve(&self, request_path: &str) -> Result<ResolvedPath, AccessDenied> {
        match &self.allowed_name {
            Some(name) => self.resolve_file_request(request_path, name),
            None => self.resolve_directory_request(request_path),
        }
    }

    /// 单文件入口：片段必须与允许的文件名完全一致（区分大小写，不允许子目录）
    pub fn resolve_file_request(
        &self,
        request_path: &str,
        allowed_name: &str,
    ) -> Result<ResolvedPath, AccessDenied> {
        let fragment = decode_request_path(request_path)?;
        if fragment != allowed_name {
            return Err(AccessDenied);
        }
        self.contain(&fragment)
    }

    /// 单文件共享时，请求的正是允许的文件名，但该文件已不在根目录下
    ///
    /// 只用于在拒绝之后区分 404；名称不符或穿越一律返回 `false`。
    pub fn is_missing_allowed_file(&self, request_path: &str) -> bool {
        let Some(name) = self.allowed_name.as_deref() else {
            return false;
        };
        match decode_request_path(request_path) {
            Ok(fragment) if fragment == name => {
                fs::symlink_metadata(self.root.join(name)).is_err()
            }
            _ => false,
        }
    }

    /// 目录入口：只要包含关系成立即可
    pub fn resolve_directory_request(
        &self,
        request_path: &str,
    ) -> Result<ResolvedPath, AccessDenied> {
        let fragment = decode_request_path(request_path)?;
        self.contain(&fragment)
    }

    fn contain(&self, fragment: &str) -> Result<ResolvedPath, AccessDenied> {
        let relative = Path::new(fragment);
        if relative
            .components()
            .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir | Component::ParentDir))
        {
            return Err(AccessDenied);
        }

        let candidate = self.root.join(relative);
        // canonicalize 要求路径存在，不存在同样视为拒绝
        let resolved = fs::canonicalize(&candidate).map_err(|_| AccessDenied)?;
        let root = fs::canonicalize(&self.root).map_err(|_| AccessDenied)?;

        // 按路径分量比较：/shared2 不属于 /shared
        if !resolved.starts_with(&root) {
            log::debug!("Rejected path escaping share root: {:?}", candidate);
            return Err(AccessDenied);
        }

        Ok(ResolvedPath {
            path: resolved,
            root,
        })
    }
}

/// 是否包含穿越序列（含 `..\\` 形式）
pub fn is_path_traversal(path: &str) -> bool {
    path.contains("..")
}

/// 去掉查询串与片段
pub fn strip_query_and_fragment(raw: &str) -> &str {
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    &raw[..end]
}

/// 解码并规范化请求路径，返回相对根目录的片段
///
/// 返回值中不含前导 `/`，空字符串表示根目录。
pub fn decode_request_path(raw: &str) -> Result<String, AccessDenied> {
    let clean = strip_query_and_fragment(raw);
    if is_path_traversal(clean) {
        return Err(AccessDenied);
    }

    let once = percent_decode(clean);
    if is_path_traversal(&once) {
        return Err(AccessDenied);
    }

    let twice = percent_decode(&once);
    if is_path_traversal(&twice) {
        return Err(AccessDenied);
    }

    if once.contains('\0') {
        return Err(AccessDenied);
    }

    let normalized = once.replace('\\', "/");
    Ok(normalized.trim_start_matches('/').to_string())
}

fn percent_decode(input: &str) -> Cow<'_, str> {
    percent_decode_str(input).decode_utf8_lossy()
}
