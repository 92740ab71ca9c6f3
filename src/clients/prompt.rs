//! 评分提示词构建
//!
//! 本地模型只接受单段 prompt，远程 API 额外带一条系统消息。
//! 两者都要求模型按固定 JSON 模板作答，方便规范化层走结构化路径。

use crate::models::grading::GradingContext;

const API_SYSTEM_MESSAGE: &str = "You are an educational AI assistant for grading student work. \
You should provide objective, constructive feedback and accurate scoring based on the given criteria. \
Always respond in Thai and provide scores in JSON format.";

const LOCAL_PREAMBLE: &str =
    "คุณเป็นผู้ช่วยอาจารย์ในการตรวจงานการศึกษา กรุณาตรวจและให้คะแนนงานนี้\n\n";

const API_PREAMBLE: &str = "กรุณาตรวจและให้คะแนนงานนี้ตามเกณฑ์ที่กำหนด\n\n";

const LOCAL_ANSWER_FORMAT: &str = r#"## คำสั่ง:
กรุณาให้คะแนนและข้อเสนอแนะในรูปแบบ JSON ดังนี้:
{
    "total_score": <คะแนนรวม 0-100>,
    "breakdown": {
        "accuracy": <คะแนนความถูกต้อง>,
        "method": <คะแนนวิธีการ>,
        "presentation": <คะแนนการนำเสนอ>
    },
    "feedback": "<ข้อเสนอแนะรายละเอียด>",
    "strengths": "<จุดเด่น>",
    "improvements": "<ข้อเสนอแนะปรับปรุง>"
}"#;

const API_ANSWER_FORMAT: &str = r#"## รูปแบบการตอบ:
กรุณาตอบในรูปแบบ JSON ดังนี้:
{
    "total_score": <คะแนนรวม 0-100>,
    "breakdown": {
        "accuracy": <คะแนนความถูกต้อง>,
        "method": <คะแนนวิธีการ>,
        "presentation": <คะแนนการนำเสนอ>
    },
    "feedback": "<ข้อเสนอแนะรายละเอียดภาษาไทย>",
    "strengths": "<จุดเด่นของงาน>",
    "improvements": "<ข้อเสนอแนะการพัฒนา>"
}"#;

/// 本地模型的完整 prompt
pub fn build_local_prompt(text: &str, context: &GradingContext) -> String {
    let mut prompt = String::from(LOCAL_PREAMBLE);
    push_context(&mut prompt, text, context);
    prompt.push_str(LOCAL_ANSWER_FORMAT);
    prompt
}

/// 远程 API 的消息
///
/// 返回 (user_message, system_message)
pub fn build_api_messages(text: &str, context: &GradingContext) -> (String, String) {
    let mut user_message = String::from(API_PREAMBLE);
    push_context(&mut user_message, text, context);
    user_message.push_str(API_ANSWER_FORMAT);

    (user_message, API_SYSTEM_MESSAGE.to_string())
}

fn push_context(buf: &mut String, text: &str, context: &GradingContext) {
    if let Some(question) = non_empty(&context.question) {
        buf.push_str(&format!("## คำถาม:\n{}\n\n", question));
    }
    if let Some(criteria) = non_empty(&context.grading_criteria) {
        buf.push_str(&format!("## เกณฑ์การประเมิน:\n{}\n\n", criteria));
    }
    if let Some(answer) = non_empty(&context.standard_answer) {
        buf.push_str(&format!("## คำตอบมาตรฐาน:\n{}\n\n", answer));
    }
    buf.push_str(&format!("## งานของนักเรียน:\n{}\n\n", text));
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
