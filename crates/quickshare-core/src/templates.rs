//! 浏览器端页面
//!
//! 非 legacy 模式下目录请求返回该页面，由页面脚本通过 `/api/tree` 与
//! `/api/content` 浏览共享内容。

use crate::listing::escape_html;

const SHELL_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{{TITLE}} - Quick Share</title>
<style>
  :root { --bg: #f6f7f9; --panel: #fff; --border: #dde1e6; --accent: #2563eb; --muted: #6b7280; }
  * { box-sizing: border-box; }
  body { margin: 0; font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif; background: var(--bg); color: #111827; }
  header { display: flex; align-items: center; justify-content: space-between; padding: 12px 20px; background: var(--panel); border-bottom: 1px solid var(--border); }
  .brand { font-weight: 600; }
  .btn { display: inline-block; padding: 6px 12px; border-radius: 6px; border: 1px solid var(--border); color: inherit; text-decoration: none; font-size: 14px; }
  .btn-primary { background: var(--accent); border-color: var(--accent); color: #fff; }
  main { display: flex; height: calc(100vh - 58px); }
  .sidebar { width: 320px; overflow: auto; background: var(--panel); border-right: 1px solid var(--border); padding: 8px 0; }
  .tree-item { padding: 4px 12px; cursor: pointer; white-space: nowrap; font-size: 14px; }
  .tree-item:hover { background: #eef2ff; }
  .content { flex: 1; overflow: auto; padding: 20px; }
  .meta { color: var(--muted); font-size: 13px; margin-bottom: 12px; }
  .empty { color: var(--muted); text-align: center; margin-top: 20vh; }
  .error { color: #b91c1c; }
  pre { background: var(--panel); border: 1px solid var(--border); border-radius: 6px; padding: 12px; overflow: auto; }
</style>
</head>
<body>
<header>
  <span class="brand">📁 {{TITLE}}</span>
  <a class="btn btn-primary" href="/?download=zip">Download All as Zip</a>
</header>
<main>
  <nav class="sidebar" id="tree"></nav>
  <section class="content" id="content"><p class="empty">Select a file to preview</p></section>
</main>
<script>
(function () {
  function formatSize(bytes) {
    var units = ["B", "KB", "MB", "GB", "TB"];
    var size = bytes, i = 0;
    while (size >= 1024 && i < units.length - 1) { size /= 1024; i++; }
    return i === 0 ? size + " B" : size.toFixed(1) + " " + units[i];
  }

  function joinPath(base, name) {
    return base === "/" ? "/" + name : base + "/" + name;
  }

  function fileUrl(path) {
    return path.split("/").map(encodeURIComponent).join("/");
  }

  function renderItems(container, base, items, depth) {
    items.forEach(function (item) {
      var path = joinPath(base, item.name);
      var row = document.createElement("div");
      row.className = "tree-item";
      row.style.paddingLeft = (12 + depth * 16) + "px";
      row.textContent = (item.type === "directory" ? "📁 " : "📄 ") + item.name;
      container.appendChild(row);

      var children = null;
      row.addEventListener("click", function () {
        if (item.type !== "directory") { preview(path, item); return; }
        if (children) { children.remove(); children = null; return; }
        children = document.createElement("div");
        row.after(children);
        loadTree(children, path, depth + 1);
      });
    });
  }

  function loadTree(container, path, depth) {
    fetch("/api/tree?path=" + encodeURIComponent(path))
      .then(function (res) { return res.json(); })
      .then(function (data) {
        if (data.error) { throw new Error(data.error); }
        renderItems(container, path, data.items, depth);
      })
      .catch(function (e) { container.textContent = "Error: " + e.message; });
  }

  function preview(path, item) {
    var content = document.getElementById("content");
    content.innerHTML = "";
    var title = document.createElement("h2");
    title.textContent = item.name;
    var meta = document.createElement("div");
    meta.className = "meta";
    meta.textContent = formatSize(item.size) + " • " + item.modified + " ";
    var link = document.createElement("a");
    link.className = "btn";
    link.href = fileUrl(path);
    link.textContent = "Download";
    meta.appendChild(link);
    content.appendChild(title);
    content.appendChild(meta);

    fetch("/api/content?path=" + encodeURIComponent(path))
      .then(function (res) { return res.json(); })
      .then(function (data) {
        var body = document.createElement(data.error ? "p" : "pre");
        if (data.error) {
          body.className = "error";
          body.textContent = data.error;
        } else {
          body.textContent = data.content;
        }
        content.appendChild(body);
      });
  }

  loadTree(document.getElementById("tree"), "/", 0);
})();
</script>
</body>
</html>
"##;

/// 生成浏览器页面
pub fn render_shell(title: &str) -> String {
    SHELL_TEMPLATE.replace("{{TITLE}}", &escape_html(title))
}
