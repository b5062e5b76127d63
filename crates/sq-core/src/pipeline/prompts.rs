//! Fixed instructions sent to the query and answer models.

/// Default site used to scope generated queries.
pub const DEFAULT_SITE: &str = "support.apple.com";

/// Instruction for the query model. `{site}` is substituted at call time.
const QUERY_GENERATION_TEMPLATE: &str = "\
你是一个搜索查询生成助手，根据用户输入，生成用于搜索引擎使用的搜索查询关键字，关键字可以有多个，确保能够搜速到用户关心的话题。
用户使用中文输入，提取出的搜索关键字为英文，因为技术文档是英文的。如果用户中英文混合输入，则英文部分是关键字的一部分
搜索范围限定为 site:{site}

举例如下：
User: 苹果手机怎么连接蓝牙耳机？
Assistant: iPhone Bluetooth connection guide site:{site}

User: 什么是Apple Business Manager？
Assistant: Apple Business Manager site:{site}
";

pub const ANSWER_SYSTEM_PROMPT: &str = "\
你是一个专业的Apple产品技术专家，服务于中国客户, 需要将输入的英文文档，整理成中文回答，并给出参考链接。
必须使用中文来回答，否则用户会给差评，从而导致你的工作被取消。
";

pub const TOOL_AGENT_SYSTEM_PROMPT: &str = "\
你是一个专业的Apple产品技术专家，服务于中国客户。
你必须使用工具来搜索相关信息，不要依赖自己的知识。
必须使用中文来回答，否则用户会给差评，从而导致你的工作被取消。
";

pub fn query_generation(site: &str) -> String {
    QUERY_GENERATION_TEMPLATE.replace("{site}", site)
}

/// The `site:` token appended to queries.
pub fn site_token(site: &str) -> String {
    format!("site:{site}")
}

pub fn tool_use_instruction(query: &str) -> String {
    format!("必须立即使用工具搜索：{query}")
}

pub fn with_question(question: &str, search_text: &str) -> String {
    format!("用户问题：{question}\n\n参考资料：\n{search_text}")
}

/// Reply used in place of a synthesized answer when the search failed.
pub fn search_failure_reply(detail: &str) -> String {
    format!(
        "抱歉，暂时无法从Apple官方文档获取相关信息，请稍后重试。\n\n（搜索失败：{detail}）"
    )
}
