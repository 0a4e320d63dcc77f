//! 请求分类
//!
//! 按固定优先级匹配：`/api/` 前缀、ZIP 下载、其他路径。

/// API 端点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiEndpoint {
    Tree,
    Content,
    Unknown,
}

/// ZIP 打包目标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZipTarget {
    /// `/download/<name>.zip`，总是打包整个共享目录
    ShareRoot,
    /// `?download=zip` / `?action=zip`，打包请求路径指向的子目录
    RequestPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Api(ApiEndpoint),
    Zip(ZipTarget),
    /// 文件下载或目录页面
    Path,
}

impl Route {
    /// `path` 为原始（未解码）路径
    pub fn classify(path: &str, query: Option<&str>) -> Self {
        if let Some(endpoint) = path.strip_prefix("/api/") {
            return Route::Api(match endpoint {
                "tree" => ApiEndpoint::Tree,
                "content" => ApiEndpoint::Content,
                _ => ApiEndpoint::Unknown,
            });
        }

        if is_restful_zip(path) {
            return Route::Zip(ZipTarget::ShareRoot);
        }
        if query.is_some_and(is_zip_query) {
            return Route::Zip(ZipTarget::RequestPath);
        }

        Route::Path
    }
}

fn is_restful_zip(path: &str) -> bool {
    path.starts_with("/download/") && path.ends_with(".zip")
}

fn is_zip_query(query: &str) -> bool {
    query
        .split('&')
        .any(|pair| pair == "download=zip" || pair == "action=zip")
}
