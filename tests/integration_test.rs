use std::sync::Arc;
use std::time::Duration;

use sugang_macro::browser::acquire;
use sugang_macro::config::Config;
use sugang_macro::infrastructure::{
    keys, AutomationPort, ChromiumPort, DocumentRef, JsExecutor, MemoryElement, MemoryPort,
    SettingsStore,
};
use sugang_macro::models::{CourseQuery, Credential, Predicate};
use sugang_macro::orchestrator::{AutomationSession, MacroState, PageEvent};
use sugang_macro::services::DocumentLocator;
use sugang_macro::utils::logging;
use sugang_macro::workflow::{LoginMode, LoginOutcome};
use tempfile::TempDir;

const ENTRY: &str = "https://sugang.example.ac.kr/core";

fn memory_session(dir: &TempDir) -> (Arc<MemoryPort>, Arc<AutomationSession<MemoryPort>>) {
    let store = SettingsStore::open(dir.path().join("settings.json")).expect("打开设置文件失败");
    let port = Arc::new(MemoryPort::with_url(ENTRY));
    let session = Arc::new(AutomationSession::new(port.clone(), Arc::new(store), ENTRY));
    (port, session)
}

/// 登录表单在 Main frame 里，页面加载完成后才出现
#[tokio::test(start_paused = true)]
async fn test_login_inside_frame_after_late_render() {
    let dir = TempDir::new().unwrap();
    let (port, session) = memory_session(&dir);
    let store = session.store();
    store
        .set_credential(&Credential::new("2024123456", "hunter2"))
        .unwrap();
    store.set_flag(keys::SAVE_LOGIN, true).unwrap();
    store.set_flag(keys::FAST_ACCESS, true).unwrap();

    let frame = port.add_frame("Main", true);
    let form = port.add(&frame, MemoryElement::new("form").hidden());
    let id = port.add_child(form, MemoryElement::input("id"));
    let pwd = port.add_child(form, MemoryElement::input("pwd").attr("type", "password"));
    let submit = port.add_child(form, MemoryElement::button("로그인"));

    let login = {
        let session = session.clone();
        tokio::spawn(async move { session.on_page_event(PageEvent::LoadFinished).await })
    };

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    port.set_visible(form, true);

    assert_eq!(login.await.unwrap(), LoginOutcome::Success);
    assert_eq!(port.value_of(id), "2024123456");
    assert_eq!(port.value_of(pwd), "hunter2");
    assert_eq!(port.activations(submit), 1);
    assert!(!port.is_watching(&frame));
}

/// 跨域 frame 拒绝访问时回退到顶层文档
#[tokio::test(start_paused = true)]
async fn test_denied_frame_falls_back_to_top_document() {
    let dir = TempDir::new().unwrap();
    let (port, session) = memory_session(&dir);
    session
        .store()
        .set_credential(&Credential::new("2024123456", "hunter2"))
        .unwrap();

    port.add_frame("Main", false);
    let id = port.add(&DocumentRef::Top, MemoryElement::input("userId"));
    port.add(
        &DocumentRef::Top,
        MemoryElement::new("input").attr("type", "password"),
    );

    assert_eq!(DocumentLocator::new().resolve(port.as_ref()).await, DocumentRef::Top);
    assert_eq!(session.login(LoginMode::FillOnly).await, LoginOutcome::Success);
    assert_eq!(port.value_of(id), "2024123456");
}

/// 登录后开启宏循环，结果行出现后点击申请，停止后不再点击
#[tokio::test(start_paused = true)]
async fn test_macro_registers_course_once_row_appears() {
    let dir = TempDir::new().unwrap();
    let (port, session) = memory_session(&dir);
    let store = session.store();
    store.set_subjects(&[CourseQuery::new("", "자료구조")]).unwrap();
    store.set_flag(keys::BYPASS_MODE, true).unwrap();
    port.set_global(&DocumentRef::Top, "ajaxTimeout", 60_000.0);
    let search = port.add(&DocumentRef::Top, MemoryElement::button("조회"));

    session.start_macro().unwrap();
    assert_eq!(session.macro_state(), MacroState::Running);
    tokio::time::sleep(Duration::from_millis(1_200)).await;

    let row = port.add(&DocumentRef::Top, MemoryElement::new("tr"));
    port.add_child(row, MemoryElement::new("td").text("COSE213   자료구조"));
    let apply = port.add_child(row, MemoryElement::new("a").attr("class", "btn-apply"));
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    let report = session.shutdown();
    assert!(report.was_running);
    assert!(port.activations(apply) >= 1);
    assert!(port.activations(search) >= 3);
    assert_eq!(port.global(&DocumentRef::Top, "ajaxTimeout"), Some(3000.0));

    let clicks = port.activations(apply);
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(port.activations(apply), clicks);
}

#[tokio::test]
#[ignore] // 默认忽略，需要手动运行：cargo test -- --ignored
async fn test_browser_connection() {
    logging::init(true);

    let config = Config::from_env();
    let result = acquire(&config).await;

    assert!(result.is_ok(), "应该能够获取浏览器页面");
}

#[tokio::test]
#[ignore]
async fn test_chromium_port_reads_live_page() {
    logging::init(true);

    let config = Config::from_env();
    let (_browser, page) = acquire(&config).await.expect("获取浏览器失败");
    let port = ChromiumPort::new(JsExecutor::new(page));

    assert!(port.is_alive().await);
    let url = port.current_url().await.expect("读取 URL 失败");
    println!("当前页面: {}", url);

    let doc = DocumentLocator::new().resolve(&port).await;
    println!("有效文档: {}", doc);
}

/// 页面反复替换结果表时，注入脚本的句柄表不会无限增长
#[tokio::test]
#[ignore]
async fn test_handle_registry_stays_bounded() {
    logging::init(true);

    let config = Config::from_env();
    let (_browser, page) = acquire(&config).await.expect("获取浏览器失败");
    let port = ChromiumPort::new(JsExecutor::new(page));
    let row = Predicate::tag("tr");

    for _ in 0..20 {
        port.executor()
            .eval(
                "document.body.innerHTML = '<table>' + \
                 '<tr><td>COSE101</td></tr>'.repeat(50) + '</table>'",
            )
            .await
            .expect("替换页面内容失败");
        let rows = port
            .query(&DocumentRef::Top, None, &row)
            .await
            .expect("查询失败");
        assert_eq!(rows.len(), 50);
    }

    let size = port
        .executor()
        .eval("window.__sugangPort.size()")
        .await
        .expect("读取句柄表大小失败");
    // 只剩最后一次替换后仍在文档中的节点
    assert!(size.as_u64().unwrap_or(u64::MAX) <= 60, "句柄表大小: {}", size);
}

