//! Known destination editors. Their DOM layouts were discovered by hand, so
//! every profile is a table of selectors and labels rather than code.

use regex::Regex;

use crate::dom::Dom;
use crate::locator;

/// Replaces the default published-signal search for a platform.
pub type PublishedFinder = fn(&dyn Dom, &Regex) -> Vec<String>;

#[derive(Debug, Clone)]
pub struct PlatformProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub editor_url: &'static str,
    pub title_selectors: &'static [&'static str],
    pub editor_selectors: &'static [&'static str],
    pub publish_labels: &'static [&'static str],
    pub publish_button_selectors: &'static [&'static str],
    pub published_url_pattern: &'static str,
    pub auto_publish_default: bool,
    pub published_finder: Option<PublishedFinder>,
}

impl PlatformProfile {
    /// Compiled published-URL pattern; `None` if the table entry is broken.
    pub fn published_regex(&self) -> Option<Regex> {
        Regex::new(self.published_url_pattern).ok()
    }

    pub fn is_publish_label(&self, text: &str) -> bool {
        let text = text.trim();
        !text.is_empty()
            && self
                .publish_labels
                .iter()
                .any(|label| text == *label || text.contains(label))
    }
}

pub const TOUTIAO: PlatformProfile = PlatformProfile {
    id: "toutiao",
    name: "Toutiao",
    editor_url: "https://mp.toutiao.com/profile_v4/graphic/publish",
    title_selectors: &[
        ".editor-title textarea",
        "textarea[placeholder*=\"标题\"]",
        "input[placeholder*=\"标题\"]",
    ],
    editor_selectors: &[
        ".ProseMirror",
        ".syl-editor [contenteditable=\"true\"]",
        "div[contenteditable=\"true\"]",
    ],
    publish_labels: &["发布", "预览并发布", "确认发布"],
    publish_button_selectors: &[
        "button.publish-btn",
        "button:contains(\"预览并发布\")",
        "button:contains(\"发布\")",
    ],
    published_url_pattern: r"https?://(?:www\.)?toutiao\.com/(?:item|article|group)/\d+",
    auto_publish_default: false,
    published_finder: None,
};

pub const ZHIHU: PlatformProfile = PlatformProfile {
    id: "zhihu",
    name: "Zhihu Column",
    editor_url: "https://zhuanlan.zhihu.com/write",
    title_selectors: &[
        "textarea.WriteIndex-titleInput",
        "textarea[placeholder*=\"标题\"]",
        "input[placeholder*=\"标题\"]",
    ],
    editor_selectors: &[
        ".public-DraftEditor-content",
        ".DraftEditor-root [contenteditable=\"true\"]",
        "div[contenteditable=\"true\"]",
    ],
    publish_labels: &["发布"],
    publish_button_selectors: &[
        "button.PublishPanel-triggerButton",
        "button:contains(\"发布\")",
    ],
    published_url_pattern: r"https?://zhuanlan\.zhihu\.com/p/\d+",
    auto_publish_default: false,
    published_finder: None,
};

pub const WEIXIN: PlatformProfile = PlatformProfile {
    id: "weixin",
    name: "WeChat Official Account",
    editor_url: "https://mp.weixin.qq.com/cgi-bin/appmsg",
    title_selectors: &["#title", "textarea.js_title", "input[placeholder*=\"标题\"]"],
    editor_selectors: &[
        ".ProseMirror",
        "#ueditor_0",
        ".edui-editor-iframeholder [contenteditable=\"true\"]",
        "div[contenteditable=\"true\"]",
    ],
    publish_labels: &["发表", "群发", "保存并群发"],
    publish_button_selectors: &[
        "#js_send",
        "button:contains(\"发表\")",
        "button:contains(\"群发\")",
    ],
    published_url_pattern: r"https?://mp\.weixin\.qq\.com/s[/?][\w\-=&%./?]+",
    auto_publish_default: false,
    published_finder: Some(weixin_published_finder),
};

pub const BAIJIAHAO: PlatformProfile = PlatformProfile {
    id: "baijiahao",
    name: "Baijiahao",
    editor_url: "https://baijiahao.baidu.com/builder/rc/edit?type=news",
    title_selectors: &[
        ".client_pages_edit_components_titleInput textarea",
        "textarea[placeholder*=\"标题\"]",
        "input[placeholder*=\"标题\"]",
    ],
    editor_selectors: &[
        ".news-editor [contenteditable=\"true\"]",
        "div[contenteditable=\"true\"]",
    ],
    publish_labels: &["发布", "确认发布"],
    publish_button_selectors: &["button:contains(\"发布\")"],
    published_url_pattern: r"https?://baijiahao\.baidu\.com/s\?id=\d+",
    auto_publish_default: true,
    published_finder: None,
};

pub const ALL: &[&PlatformProfile] = &[&TOUTIAO, &ZHIHU, &WEIXIN, &BAIJIAHAO];

pub fn by_id(id: &str) -> Option<&'static PlatformProfile> {
    ALL.iter().copied().find(|p| p.id.eq_ignore_ascii_case(id))
}

/// Platform whose editor or published pages live at `url`.
pub fn for_url(url: &str) -> Option<&'static PlatformProfile> {
    let host = url::Url::parse(url).ok()?.host_str()?.to_ascii_lowercase();
    ALL.iter().copied().find(|p| {
        url::Url::parse(p.editor_url)
            .ok()
            .and_then(|editor| editor.host_str().map(str::to_ascii_lowercase))
            .is_some_and(|editor_host| editor_host == host)
    })
}

/// The official-account composer never shows the permalink after sending;
/// the success toast is the signal, paired with any article link on screen.
fn weixin_published_finder(dom: &dyn Dom, pattern: &Regex) -> Vec<String> {
    let confirmed = ["发表成功", "已群发"]
        .iter()
        .any(|text| !locator::find_by_text(dom, text, false).is_empty());
    if !confirmed {
        return Vec::new();
    }
    let mut urls = crate::detector::published_urls(dom, pattern);
    if urls.is_empty() {
        urls.push(dom.location());
    }
    urls
}
