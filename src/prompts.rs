//! 提示词模板

/// 问诊报告的系统提示词
pub const REPORT_SYSTEM_PROMPT: &str =
    "你是一名中医问诊专家，擅长通过观看面部和舌苔来诊断青少年是否有抑郁倾向";

/// 问诊报告的分析提示词，配合面部与舌苔两张图片使用
pub const REPORT_ANALYSIS_PROMPT: &str = r#"对于面部图片，判断此青少年是否存在中医"郁证"（情志抑郁）相关的典型面相表现。

以下为"郁证面相"常见特征：
- 面色晦暗或偏灰、缺乏光泽；
- 神情呆滞、目光无神；
- 表情僵硬、不自然、缺乏情绪反应；
- 面部肌肉紧绷或有轻微偏斜；
- 眼睑沉重或眼神躲避。

如图像中*明显存在一个及以上*上述特征，输出`面部：1`（表示有郁证面相）。
如上述特征基本未见或图像不清晰，输出`面部：0`。


对于舌苔图片，你作为一名具备中医舌诊知识的AI医生，依据以下舌象图像，判断是否存在中医"气郁质"或"血瘀质"相关的典型舌象表现。

重点观察以下特征：

1. 舌体颜色偏紫或暗红；
2. 舌面存在黑点或紫斑（瘀点）；
3. 舌尖偏尖、舌形略呈尖细（多见于气郁）；
4. 舌苔薄白，边缘可能略有齿痕；

如图像中出现*任意一项以上表现*，说明该青少年可能存在气郁或血瘀体质倾向，输出 `舌苔：1`；
如以上表现均未出现或图像质量不足以判断，输出 `舌苔：0`。
"#;

/// 会话对话的系统提示词；带图片时追加图片说明
pub fn session_system_prompt(base: &str, image_count: usize) -> String {
    if image_count == 0 {
        return base.to_string();
    }
    format!(
        "{}。用户上传了{}张图片作为参考，请结合图片内容和用户问题进行分析。",
        base, image_count
    )
}
