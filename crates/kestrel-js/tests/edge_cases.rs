//! Edge case tests for kestrel-js
//!
//! Error paths, limits and unusual page content.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use kestrel_dom::{ControlSpec, ControlType, Document, FormSpec};
use kestrel_js::{HeapEngine, HeapLimits, InterpreterContext, JsConfig, JsError, ScriptError};
use kestrel_net::ScriptedLoader;

fn context(doc: Document, config: JsConfig) -> Result<(InterpreterContext, Rc<RefCell<Document>>, Rc<ScriptedLoader>)> {
    let document = Rc::new(RefCell::new(doc));
    let loader = Rc::new(ScriptedLoader::new());
    let ctx = InterpreterContext::new(document.clone(), loader.clone(), config)?;
    Ok((ctx, document, loader))
}

fn blank() -> Result<(InterpreterContext, Rc<RefCell<Document>>, Rc<ScriptedLoader>)> {
    context(Document::parse("http://example.com/")?, JsConfig::default())
}

fn is_type_error<T>(result: Result<T, JsError>) -> bool {
    matches!(result, Err(JsError::Script(ScriptError::Type(_))))
}

// ============================================================================
// EVALUATION
// ============================================================================

#[test]
fn test_empty_and_comment_only() -> Result<()> {
    let (mut ctx, _, _) = blank()?;
    assert!(ctx.eval("")?.is_undefined());
    assert!(ctx.eval("   \n\t  ")?.is_undefined());
    assert!(ctx.eval("// just a comment\n/* block */")?.is_undefined());
    Ok(())
}

#[test]
fn test_syntax_error_surfaces() -> Result<()> {
    let (mut ctx, _, _) = blank()?;
    assert!(matches!(ctx.eval("var = ;"), Err(JsError::Script(ScriptError::Syntax(_)))));
    // The context stays usable
    assert_eq!(ctx.eval_to_string("1 + 1")?, "2");
    Ok(())
}

#[test]
fn test_runaway_recursion() -> Result<()> {
    let document = Rc::new(RefCell::new(Document::parse("http://example.com/")?));
    let engine = HeapEngine::new(HeapLimits { max_call_depth: 32, ..HeapLimits::default() });
    let mut ctx = InterpreterContext::with_engine(engine, document, Rc::new(ScriptedLoader::new()), JsConfig::default())?;
    let result = ctx.eval("function f() { return f(); } f()");
    assert!(matches!(result, Err(JsError::Script(ScriptError::Range(_)))));
    Ok(())
}

#[test]
fn test_deeply_nested_source() -> Result<()> {
    let (mut ctx, _, _) = blank()?;
    for n in [2_000, 100_000] {
        let source = format!("{}1{}", "(".repeat(n), ")".repeat(n));
        assert!(matches!(ctx.eval(&source), Err(JsError::Script(ScriptError::Range(_)))));
    }
    let chain = format!("var x = 0; x{}", " + 1".repeat(20_000));
    assert!(matches!(ctx.eval(&chain), Err(JsError::Script(ScriptError::Range(_)))));
    assert_eq!(ctx.eval_to_string("(((2)))")?, "2");
    Ok(())
}

#[test]
fn test_default_limits_stop_recursion() -> Result<()> {
    let (mut ctx, _, _) = blank()?;
    let result = ctx.eval("function f() { return f(); } f()");
    assert!(matches!(result, Err(JsError::Script(ScriptError::Range(_)))));
    assert_eq!(ctx.eval_to_string("typeof f")?, "function");
    Ok(())
}

#[test]
fn test_disabled_from_json() -> Result<()> {
    let config = JsConfig::from_json(r#"{"enabled": false}"#)?;
    let (mut ctx, _, _) = context(Document::parse("http://example.com/")?, config)?;
    assert!(ctx.eval("this is not even valid")?.is_undefined());
    Ok(())
}

// ============================================================================
// COLLECTIONS
// ============================================================================

#[test]
fn test_reserved_control_names() -> Result<()> {
    let mut doc = Document::parse("http://example.com/")?;
    let form = doc.add_form(FormSpec::new().with_name("f"));
    doc.add_control(form, ControlSpec::new(ControlType::Text).with_name("item"))?;
    doc.add_control(form, ControlSpec::new(ControlType::Text).with_name("namedItem"))?;
    let (mut ctx, _, _) = context(doc, JsConfig::default())?;

    assert_eq!(ctx.eval_to_string("var e = document.forms.f.elements; typeof e.item + typeof e.namedItem")?, "functionfunction");
    assert_eq!(ctx.eval_to_string("e.namedItem('item') === e[0]")?, "true");
    assert_eq!(ctx.eval_to_string("e.namedItem('NAMEDITEM') === e[1]")?, "true");
    Ok(())
}

#[test]
fn test_duplicate_names_last_wins() -> Result<()> {
    let mut doc = Document::parse("http://example.com/")?;
    let form = doc.add_form(FormSpec::new());
    doc.add_control(form, ControlSpec::new(ControlType::Text).with_name("dup").with_value("first"))?;
    doc.add_control(form, ControlSpec::new(ControlType::Text).with_name("dup").with_value("second"))?;
    let (mut ctx, _, _) = context(doc, JsConfig::default())?;

    assert_eq!(ctx.eval_to_string("document.forms[0].elements.dup.value")?, "second");
    assert_eq!(ctx.eval_to_string("document.forms[0].elements.namedItem('dup').value")?, "first");
    Ok(())
}

#[test]
fn test_empty_collections() -> Result<()> {
    let (mut ctx, _, _) = blank()?;
    assert_eq!(ctx.eval_to_string("document.forms.length")?, "0");
    assert_eq!(ctx.eval_to_string("document.forms.item(0)")?, "null");
    assert_eq!(ctx.eval_to_string("typeof document.forms.missing")?, "undefined");
    assert_eq!(ctx.eval_to_string("document.getElementById('none')")?, "null");
    assert_eq!(ctx.eval_to_string("document.getElementsByTagName('p').length")?, "0");
    Ok(())
}

#[test]
fn test_method_with_foreign_this() -> Result<()> {
    let mut doc = Document::parse("http://example.com/")?;
    doc.add_form(FormSpec::new());
    let (mut ctx, document, _) = context(doc, JsConfig::default())?;

    let result = ctx.eval_to_string("var o = {}; o.submit = document.forms[0].submit; o.submit()")?;
    assert_eq!(result, "null");
    assert!(document.borrow().requests().is_empty());
    Ok(())
}

#[test]
fn test_plain_element() -> Result<()> {
    let mut doc = Document::parse("http://example.com/")?;
    let div = doc.add_element("div");
    if let Some(element) = doc.element_mut(div) {
        element.set_attribute("id", "main");
        element.set_attribute("data-x", "7");
    }
    let (mut ctx, _, _) = context(doc, JsConfig::default())?;

    assert_eq!(ctx.eval_to_string("var d = document.getElementById('main'); d.tagName + ' ' + d.id")?, "DIV main");
    assert_eq!(ctx.eval_to_string("d.getAttribute('data-x') + ' ' + d.getAttribute('nope')")?, "7 null");
    Ok(())
}

// ============================================================================
// TIMERS
// ============================================================================

#[test]
fn test_timer_without_callback() -> Result<()> {
    let (mut ctx, _, _) = blank()?;
    assert!(is_type_error(ctx.eval("setTimeout()")));
    assert!(is_type_error(ctx.eval("setInterval(42, 10)")));
    Ok(())
}

#[test]
fn test_pending_operation_limit() -> Result<()> {
    let config = JsConfig { max_pending_operations: 2, ..JsConfig::default() };
    let (mut ctx, _, _) = context(Document::parse("http://example.com/")?, config)?;
    ctx.eval("setTimeout('1', 10); setTimeout('2', 10)")?;
    assert!(matches!(ctx.eval("setTimeout('3', 10)"), Err(JsError::Script(ScriptError::Range(_)))));

    ctx.advance(Duration::from_millis(10));
    ctx.run_bottom_halves()?;
    assert!(ctx.eval("setTimeout('4', 10)").is_ok());
    Ok(())
}

#[test]
fn test_throwing_timer_does_not_stop_others() -> Result<()> {
    let (mut ctx, _, _) = blank()?;
    ctx.eval("var ok = false; setTimeout(function() { missing(); }, 5); setTimeout(function() { ok = true; }, 5)")?;
    ctx.advance(Duration::from_millis(5));
    assert_eq!(ctx.run_bottom_halves()?, 2);
    assert_eq!(ctx.eval_to_string("ok")?, "true");
    Ok(())
}

#[test]
fn test_negative_delay_runs_immediately() -> Result<()> {
    let (mut ctx, _, _) = blank()?;
    ctx.eval("var ran = false; setTimeout(function() { ran = true; }, -50)")?;
    assert_eq!(ctx.time_until_next_timer(), Some(Duration::ZERO));
    ctx.advance(Duration::ZERO);
    ctx.run_bottom_halves()?;
    assert_eq!(ctx.eval_to_string("ran")?, "true");
    Ok(())
}

#[test]
fn test_interval_fires_once_per_advance() -> Result<()> {
    let (mut ctx, _, _) = blank()?;
    ctx.eval("var n = 0; setInterval(function() { n += 1; }, 10)")?;
    // Several periods elapse, one firing is delivered
    assert_eq!(ctx.advance(Duration::from_millis(100)), 1);
    ctx.run_bottom_halves()?;
    assert_eq!(ctx.eval_to_string("n")?, "1");
    Ok(())
}

// ============================================================================
// XMLHTTPREQUEST
// ============================================================================

#[test]
fn test_headers_before_response() -> Result<()> {
    let (mut ctx, _, _) = blank()?;
    ctx.eval("var r = new XMLHttpRequest(); r.open('GET', '/a')")?;
    assert_eq!(ctx.eval_to_string("r.getResponseHeader('content-type')")?, "null");
    assert_eq!(ctx.eval_to_string("r.getAllResponseHeaders() === '' && r.responseText === ''")?, "true");
    assert!(is_type_error(ctx.eval("r.overrideMimeType('text/plain')")));
    assert!(is_type_error(ctx.eval("r.setRequestHeader('bad name', 'x')")));
    Ok(())
}

#[test]
fn test_forbidden_header_ignored() -> Result<()> {
    let (mut ctx, _, loader) = blank()?;
    ctx.eval("var r = new XMLHttpRequest(); r.open('GET', '/a'); r.setRequestHeader('Cookie', 'x=1'); r.setRequestHeader('X-One', 'a'); r.send()")?;
    let request = loader.requests().pop().expect("request started");
    assert!(!request.headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("cookie")));
    assert!(request.headers.iter().any(|(name, value)| name == "X-One" && value == "a"));
    Ok(())
}

#[test]
fn test_all_response_headers() -> Result<()> {
    let (mut ctx, _, loader) = blank()?;
    ctx.eval("var r = new XMLHttpRequest(); r.open('GET', '/a'); r.send()")?;
    let handle = loader.last_handle().expect("request started");
    loader.respond(handle, "HTTP/1.1 404 Not Found\r\nContent-Type: text/html\r\nSet-Cookie: a\r\nset-cookie: b\r\n", b"")?;
    ctx.run_bottom_halves()?;

    let raw = ctx.eval_to_string("r.getAllResponseHeaders()")?;
    assert!(raw.contains("Content-Type: text/html\r\n"));
    assert!(raw.contains("Set-Cookie: a, b\r\n"));
    assert_eq!(ctx.eval_to_string("r.status + ' ' + r.readyState")?, "404 4");
    Ok(())
}

#[test]
fn test_timeout_event() -> Result<()> {
    let (mut ctx, _, loader) = blank()?;
    ctx.eval(
        "var seen = ''; var r = new XMLHttpRequest(); r.timeout = 500;
         r.ontimeout = function(e) { seen += e.type; };
         r.addEventListener('loadend', function(e) { seen += ' ' + e.type; });
         r.open('GET', '/slow'); r.send()",
    )?;
    let handle = loader.last_handle().expect("request started");
    let request = loader.request(handle).expect("request recorded");
    assert_eq!(request.timeout, Some(Duration::from_millis(500)));

    loader.time_out(handle);
    ctx.run_bottom_halves()?;
    assert_eq!(ctx.eval_to_string("seen + ' ' + r.readyState")?, "timeout loadend 4");
    Ok(())
}

#[test]
fn test_listener_registered_once() -> Result<()> {
    let (mut ctx, _, loader) = blank()?;
    ctx.eval(
        "var hits = 0; var dropped = 0;
         function onLoad() { hits += 1; }
         function never() { dropped += 1; }
         var r = new XMLHttpRequest();
         r.addEventListener('load', onLoad); r.addEventListener('load', onLoad);
         r.addEventListener('load', never); r.removeEventListener('load', never);
         r.open('GET', '/a'); r.send()",
    )?;
    let handle = loader.last_handle().expect("request started");
    loader.respond(handle, "HTTP/1.1 200 OK\r\n", b"x")?;
    ctx.run_bottom_halves()?;
    assert_eq!(ctx.eval_to_string("hits + ' ' + dropped")?, "1 0");
    Ok(())
}

#[test]
fn test_reopen_supersedes_running_request() -> Result<()> {
    let (mut ctx, _, loader) = blank()?;
    ctx.eval("var bodies = ''; var r = new XMLHttpRequest(); r.onload = function() { bodies += r.responseText; }; r.open('GET', '/one'); r.send()")?;
    let first = loader.last_handle().expect("first request");
    ctx.eval("r.open('GET', '/two'); r.send()")?;
    let second = loader.last_handle().expect("second request");
    assert!(loader.is_cancelled(first));

    loader.respond(first, "HTTP/1.1 200 OK\r\n", b"stale")?;
    loader.respond(second, "HTTP/1.1 200 OK\r\n", b"fresh")?;
    ctx.run_bottom_halves()?;
    assert_eq!(ctx.eval_to_string("bodies")?, "fresh");
    Ok(())
}

#[test]
fn test_abort_after_done_resets() -> Result<()> {
    let (mut ctx, _, loader) = blank()?;
    ctx.eval("var aborts = 0; var r = new XMLHttpRequest(); r.onabort = function() { aborts += 1; }; r.open('GET', '/a'); r.send()")?;
    let handle = loader.last_handle().expect("request started");
    loader.respond(handle, "HTTP/1.1 200 OK\r\n", b"x")?;
    ctx.run_bottom_halves()?;
    ctx.eval("r.abort()")?;
    ctx.run_bottom_halves()?;
    assert_eq!(ctx.eval_to_string("r.readyState + ' ' + aborts")?, "0 0");
    Ok(())
}

#[test]
fn test_unreferenced_request_still_completes() -> Result<()> {
    let (mut ctx, _, loader) = blank()?;
    ctx.eval("var done = false; (function() { var r = new XMLHttpRequest(); r.onload = function() { done = true; }; r.open('GET', '/a'); r.send(); })()")?;
    ctx.collect_garbage();
    let handle = loader.last_handle().expect("request started");
    assert!(!loader.is_cancelled(handle));
    loader.respond(handle, "HTTP/1.1 200 OK\r\n", b"x")?;
    ctx.run_bottom_halves()?;
    assert_eq!(ctx.eval_to_string("done")?, "true");

    // Nothing holds the request any more
    ctx.collect_garbage();
    assert_eq!(ctx.registry_stats().live, 1);
    Ok(())
}

// ============================================================================
// WINDOW
// ============================================================================

#[test]
fn test_status_line() -> Result<()> {
    let (mut ctx, document, _) = blank()?;
    ctx.eval("window.status = 'Loading...'")?;
    assert_eq!(document.borrow().status(), "Loading...");
    assert_eq!(ctx.eval_to_string("status")?, "Loading...");
    Ok(())
}

#[test]
fn test_message_to_onmessage() -> Result<()> {
    let (mut ctx, _, _) = blank()?;
    ctx.eval("var got = null; onmessage = function(e) { got = e.data; }; postMessage('hi', '/')")?;
    ctx.run_bottom_halves()?;
    assert_eq!(ctx.eval_to_string("got")?, "hi");
    Ok(())
}

#[test]
fn test_messages_dropped_on_teardown() -> Result<()> {
    let (mut ctx, _, _) = blank()?;
    ctx.eval("postMessage({ big: 'payload' }, '*')")?;
    assert!(ctx.has_pending_work());
    drop(ctx);
    Ok(())
}
