//! Chromium 端口适配器 - 基础设施层
//!
//! 通过一段注入脚本（`window.__sugangPort`）在页面里执行端口操作。
//! 元素句柄是注入脚本内部注册表分配的编号，同一元素总是拿到同一编号。
//! 每次查询前会清掉已脱离文档的元素，注册表大小跟随当前 DOM；
//! 旧句柄以 `stale-element` 脚本错误的形式返回。

use async_trait::async_trait;
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, warn};

use crate::error::{AutomationError, AutomationResult};
use crate::infrastructure::port::{AutomationPort, DocumentRef, DomEvent, ElementHandle};
use crate::infrastructure::JsExecutor;
use crate::models::Predicate;

/// 变更通知使用的 CDP binding 名称
const MUTATION_BINDING: &str = "__sugangMutation";

/// 注入脚本，重复执行是安全的
const PORT_BOOTSTRAP: &str = r#"
if (!window.__sugangPort) {
  window.__sugangPort = (() => {
    const els = new Map();
    const ids = new WeakMap();
    let next = 0;
    const observers = new Map();
    const INTERACTIVE = 'button, a, input[type=submit], input[type=button], [role=button]';
    const docOf = (frame) => {
      if (frame === null) return document;
      const host = document.getElementById(frame) || document.getElementsByName(frame)[0];
      if (!host) return null;
      let d = null;
      try { d = host.contentDocument; if (d) void d.body; } catch (e) { throw new Error('access-denied'); }
      if (!d) throw new Error('access-denied');
      return d;
    };
    const reg = (el) => {
      let id = ids.get(el);
      if (id === undefined || !els.has(id)) {
        id = next++;
        ids.set(el, id);
        els.set(id, el);
      }
      return id;
    };
    const get = (id) => {
      const el = els.get(id);
      if (!el || !el.isConnected) throw new Error('stale-element');
      return el;
    };
    const prune = () => {
      for (const [id, el] of els) {
        if (!el.isConnected) els.delete(id);
      }
    };
    const norm = (s) => String(s ?? '').trim().toLowerCase();
    const matches = (el, p) => {
      switch (p.kind) {
        case 'attr_equals': return el.getAttribute(p.attr) === p.value;
        case 'attr_contains': {
          const v = el.getAttribute(p.attr);
          return v !== null && v.includes(p.needle);
        }
        case 'tag_type':
          return el.tagName.toLowerCase() === p.tag.toLowerCase()
            && (p.input_type === null || norm(el.type) === norm(p.input_type));
        case 'text': return norm(el.innerText || el.value || el.textContent) === norm(p.text);
        default: return false;
      }
    };
    return {
      frame(frame) {
        try { return docOf(frame) ? 'ok' : 'missing'; } catch (e) { return 'denied'; }
      },
      size() { return els.size; },
      query(frame, scope, p) {
        prune();
        const d = docOf(frame);
        if (!d) return [];
        const root = scope === null ? d : get(scope);
        const sel = p.kind === 'text' ? INTERACTIVE : (p.kind === 'tag_type' ? p.tag : '*');
        return Array.from(root.querySelectorAll(sel)).filter((el) => matches(el, p)).map(reg);
      },
      visible(id) { return get(id).getClientRects().length > 0; },
      value(id) { return String(get(id).value ?? ''); },
      setValue(id, v) { get(id).value = v; return true; },
      focus(id) { get(id).focus(); return true; },
      dispatch(id, type) {
        const el = get(id);
        const ev = type === 'keyup' ? new KeyboardEvent('keyup', { bubbles: true })
          : type === 'blur' ? new FocusEvent('blur')
          : new Event(type, { bubbles: true });
        el.dispatchEvent(ev);
        return true;
      },
      click(id) { get(id).click(); return true; },
      text(id) { const el = get(id); return String(el.innerText ?? el.textContent ?? '').trim(); },
      observe(frame, key, binding) {
        const d = docOf(frame);
        if (!d || observers.has(key)) return !!d;
        let pending = false;
        const mo = new MutationObserver(() => {
          if (pending) return;
          pending = true;
          queueMicrotask(() => { pending = false; if (window[binding]) window[binding](key); });
        });
        mo.observe(d, { subtree: true, childList: true, attributes: true });
        observers.set(key, mo);
        return true;
      },
      unobserve(key) {
        const mo = observers.get(key);
        if (mo) { mo.disconnect(); observers.delete(key); }
        return true;
      },
      stripAttr(frame, name) {
        const d = docOf(frame);
        if (!d) return 0;
        const found = d.querySelectorAll('[' + CSS.escape(name) + ']');
        found.forEach((el) => el.removeAttribute(name));
        return found.length;
      },
      getGlobal(frame, name) {
        const d = docOf(frame);
        const w = d && d.defaultView;
        return w && typeof w[name] === 'number' ? w[name] : null;
      },
      setGlobal(frame, name, value) {
        const d = docOf(frame);
        const w = d && d.defaultView;
        if (!w || typeof w[name] !== 'number') return false;
        w[name] = value;
        return true;
      },
    };
  })();
}
"#;

/// Chromium 端口
pub struct ChromiumPort {
    executor: JsExecutor,
    binding: OnceCell<()>,
    watchers: Arc<Mutex<HashMap<String, mpsc::Sender<()>>>>,
}

impl ChromiumPort {
    pub fn new(executor: JsExecutor) -> Self {
        Self {
            executor,
            binding: OnceCell::new(),
            watchers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn executor(&self) -> &JsExecutor {
        &self.executor
    }

    /// 执行 `window.__sugangPort.<method>(args...)`
    async fn call(&self, method: &str, args: &[JsonValue]) -> AutomationResult<JsonValue> {
        let args = args
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");
        let js_code = format!(
            "(() => {{ {} return window.__sugangPort.{}({}); }})()",
            PORT_BOOTSTRAP, method, args
        );
        self.executor.eval(js_code).await
    }

    async fn call_as<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        args: &[JsonValue],
    ) -> AutomationResult<T> {
        let value = self.call(method, args).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// 注册 binding 并启动转发任务，只执行一次
    async fn ensure_binding(&self) -> AutomationResult<()> {
        self.binding
            .get_or_try_init(|| async {
                let page = self.executor.page();
                page.execute(AddBindingParams::new(MUTATION_BINDING)).await?;
                let mut events = page.event_listener::<EventBindingCalled>().await?;
                let watchers = Arc::clone(&self.watchers);

                tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        if event.name != MUTATION_BINDING {
                            continue;
                        }
                        let guard = watchers.lock().unwrap_or_else(PoisonError::into_inner);
                        if let Some(tx) = guard.get(&event.payload) {
                            // 通道已满说明上一次通知还没被消费，直接合并
                            let _ = tx.try_send(());
                        }
                    }
                    debug!("变更通知转发任务结束");
                });
                Ok::<(), AutomationError>(())
            })
            .await?;
        Ok(())
    }

    fn frame_arg(doc: &DocumentRef) -> JsonValue {
        to_json(&doc.frame_id())
    }
}

fn to_json<T: Serialize>(value: &T) -> JsonValue {
    serde_json::to_value(value).unwrap_or(JsonValue::Null)
}

fn watch_key(doc: &DocumentRef) -> String {
    doc.frame_id().unwrap_or("top").to_string()
}

#[async_trait]
impl AutomationPort for ChromiumPort {
    async fn is_alive(&self) -> bool {
        self.executor.eval("true").await.is_ok()
    }

    async fn frame_document(&self, frame_id: &str) -> AutomationResult<Option<DocumentRef>> {
        let status: String = self.call_as("frame", &[to_json(&frame_id)]).await?;
        match status.as_str() {
            "ok" => Ok(Some(DocumentRef::Frame(frame_id.to_string()))),
            "denied" => Err(AutomationError::Access {
                frame: frame_id.to_string(),
            }),
            _ => Ok(None),
        }
    }

    async fn query(
        &self,
        doc: &DocumentRef,
        scope: Option<ElementHandle>,
        predicate: &Predicate,
    ) -> AutomationResult<Vec<ElementHandle>> {
        let ids: Vec<u64> = self
            .call_as(
                "query",
                &[
                    Self::frame_arg(doc),
                    to_json(&scope.map(|s| s.0)),
                    serde_json::to_value(predicate)?,
                ],
            )
            .await?;
        Ok(ids.into_iter().map(ElementHandle).collect())
    }

    async fn is_visible(&self, element: ElementHandle) -> AutomationResult<bool> {
        self.call_as("visible", &[to_json(&element.0)]).await
    }

    async fn value(&self, element: ElementHandle) -> AutomationResult<String> {
        self.call_as("value", &[to_json(&element.0)]).await
    }

    async fn set_value(&self, element: ElementHandle, value: &str) -> AutomationResult<()> {
        self.call("setValue", &[to_json(&element.0), to_json(&value)])
            .await?;
        Ok(())
    }

    async fn focus(&self, element: ElementHandle) -> AutomationResult<()> {
        self.call("focus", &[to_json(&element.0)]).await?;
        Ok(())
    }

    async fn dispatch(&self, element: ElementHandle, event: DomEvent) -> AutomationResult<()> {
        self.call("dispatch", &[to_json(&element.0), to_json(&event.as_str())])
            .await?;
        Ok(())
    }

    async fn activate(&self, element: ElementHandle) -> AutomationResult<()> {
        self.call("click", &[to_json(&element.0)]).await?;
        Ok(())
    }

    async fn text(&self, element: ElementHandle) -> AutomationResult<String> {
        self.call_as("text", &[to_json(&element.0)]).await
    }

    async fn watch_mutations(&self, doc: &DocumentRef) -> AutomationResult<mpsc::Receiver<()>> {
        self.ensure_binding().await?;

        let key = watch_key(doc);
        let (tx, rx) = mpsc::channel(1);
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), tx);

        let installed: bool = self
            .call_as(
                "observe",
                &[Self::frame_arg(doc), to_json(&key), to_json(&MUTATION_BINDING)],
            )
            .await?;
        if !installed {
            warn!("无法在 {} 上安装变更观察器", doc);
        }
        Ok(rx)
    }

    async fn unwatch_mutations(&self, doc: &DocumentRef) -> AutomationResult<()> {
        let key = watch_key(doc);
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        self.call("unobserve", &[to_json(&key)]).await?;
        Ok(())
    }

    async fn current_url(&self) -> AutomationResult<String> {
        self.executor.url().await
    }

    async fn navigate(&self, url: &str) -> AutomationResult<()> {
        self.executor.goto(url).await
    }

    async fn strip_attribute(&self, doc: &DocumentRef, attr: &str) -> AutomationResult<usize> {
        self.call_as("stripAttr", &[Self::frame_arg(doc), to_json(&attr)])
            .await
    }

    async fn global_number(&self, doc: &DocumentRef, name: &str) -> AutomationResult<Option<f64>> {
        self.call_as("getGlobal", &[Self::frame_arg(doc), to_json(&name)])
            .await
    }

    async fn set_global_number(
        &self,
        doc: &DocumentRef,
        name: &str,
        value: f64,
    ) -> AutomationResult<bool> {
        self.call_as(
            "setGlobal",
            &[Self::frame_arg(doc), to_json(&name), to_json(&value)],
        )
        .await
    }
}
