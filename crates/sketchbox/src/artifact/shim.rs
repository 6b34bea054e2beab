//! JavaScript emitted into script-mode artifacts.
//!
//! `SHIM_JS` mirrors [`crate::shim::LifecycleShim`]: same counters, same event
//! order, same fault tags. `__SKETCHBOX_CONFIG__` is replaced with a JSON
//! object produced by [`shim_config_json`].

use serde::Serialize;

use crate::model::{RunId, MESSAGE_SOURCE, PROTOCOL_VERSION};

pub(crate) const CONFIG_PLACEHOLDER: &str = "__SKETCHBOX_CONFIG__";

pub(crate) const SHIM_JS: &str = r#"(function () {
  'use strict';
  var cfg = __SKETCHBOX_CONFIG__;
  var state = { frames: 0, setupStarted: false, firstFrameSent: false, limitHit: false };
  var host = window.parent;

  function post(payload) {
    payload.source = cfg.source;
    payload.protocolVersion = cfg.protocolVersion;
    payload.runId = cfg.runId;
    try { host.postMessage(payload, '*'); } catch (e) { /* host gone */ }
  }

  function panel(text) {
    var el = document.getElementById('sketchbox-error');
    if (!el) {
      el = document.createElement('pre');
      el.id = 'sketchbox-error';
      el.setAttribute('style', 'position:fixed;left:0;right:0;bottom:0;margin:0;padding:8px;' +
        'max-height:40%;overflow:auto;background:#fde8e8;color:#9b1c1c;' +
        'font:12px/1.4 monospace;white-space:pre-wrap;z-index:2147483647');
      (document.body || document.documentElement).appendChild(el);
    }
    el.textContent += text + '\n';
  }

  function messageOf(err) {
    if (err && typeof err.message === 'string') { return err.message; }
    return String(err);
  }

  function snippetLine(line) {
    if (typeof line !== 'number' || line <= cfg.lineOffset) { return null; }
    return line - cfg.lineOffset;
  }

  function lineOf(err) {
    var stack = err && typeof err.stack === 'string' ? err.stack : '';
    var match = /:(\d+):\d+/.exec(stack);
    return match ? snippetLine(parseInt(match[1], 10)) : null;
  }

  function report(message, line, context) {
    panel((line ? 'Line ' + line + ': ' : '') + message);
    post({ type: 'error', message: String(message), line: line, context: context });
  }

  function markFirstFrame() {
    if (!state.firstFrameSent) {
      state.firstFrameSent = true;
      post({ type: 'firstFrame' });
    }
  }

  window.addEventListener('error', function (ev) {
    var message = ev.message || messageOf(ev.error);
    report(message, snippetLine(ev.lineno), state.setupStarted ? 'runtime' : 'load');
    ev.preventDefault();
  });

  window.addEventListener('unhandledrejection', function (ev) {
    report(messageOf(ev.reason), lineOf(ev.reason), state.setupStarted ? 'runtime' : 'load');
    ev.preventDefault();
  });

  function disabled(name) {
    return function () { throw new Error(name + ' is disabled in the sandbox'); };
  }
  // Constructors reachable through `(function(){}).constructor` and friends.
  // Captured before the global is replaced, otherwise the stub's own
  // prototype gets patched and the native one stays open.
  var NativeFunction = Function;
  var constructors = [NativeFunction];
  [function* () {}, async function () {}, async function* () {}].forEach(function (fn) {
    try { constructors.push(Object.getPrototypeOf(fn).constructor); } catch (e) { /* unsupported */ }
  });
  window.eval = disabled('eval');
  window.Function = disabled('Function');
  constructors.forEach(function (Ctor) {
    try {
      Object.defineProperty(Ctor.prototype, 'constructor', { value: disabled('Function') });
    } catch (e) { /* frozen prototype */ }
  });

  if (!cfg.enableStorage) {
    ['localStorage', 'sessionStorage', 'indexedDB'].forEach(function (name) {
      try {
        Object.defineProperty(window, name, { get: disabled(name), configurable: false });
      } catch (e) { /* left to the content security policy */ }
    });
  }

  function wrapSetup(setup) {
    return function () {
      state.setupStarted = true;
      var result;
      var failed = false;
      try {
        result = setup.apply(this, arguments);
      } catch (err) {
        failed = true;
        report(messageOf(err), lineOf(err), 'setup');
      }
      // setup may have bound draw itself; wrap it before deciding whether
      // this is a static sketch.
      adopt('draw');
      if (!failed) { post({ type: 'setupComplete' }); }
      if (typeof window.draw !== 'function') { markFirstFrame(); }
      return failed ? undefined : result;
    };
  }

  function wrapDraw(draw) {
    return function () {
      if (state.limitHit) { return undefined; }
      state.frames += 1;
      if (state.frames > cfg.maxFrames) {
        state.limitHit = true;
        try { if (typeof window.noLoop === 'function') { window.noLoop(); } } catch (e) { /* ignore */ }
        report('Stopped after ' + cfg.maxFrames + ' frames', null, 'frame-limit');
        return undefined;
      }
      markFirstFrame();
      try {
        return draw.apply(this, arguments);
      } catch (err) {
        report(messageOf(err), lineOf(err), 'draw');
        return undefined;
      }
    };
  }

  var wrappers = { setup: wrapSetup, draw: wrapDraw };

  function wrap(name, fn) {
    if (typeof fn !== 'function' || fn.__sketchboxWrapped) { return fn; }
    var wrapped = wrappers[name](fn);
    wrapped.__sketchboxWrapped = true;
    return wrapped;
  }

  // Wrap whatever the hook slot holds now, unless it is already wrapped.
  function adopt(name) {
    var current = window[name];
    var wrapped = wrap(name, current);
    if (wrapped !== current) {
      try { window[name] = wrapped; } catch (e) { /* read-only binding */ }
    }
  }

  // Keep wrapping on every later write, so the hook written last before its
  // first invocation is the one that runs. Declared functions are
  // non-configurable globals; those fall back to adopt() after setup.
  function trap(name) {
    var current = wrap(name, window[name]);
    try {
      Object.defineProperty(window, name, {
        configurable: true,
        enumerable: true,
        get: function () { return current; },
        set: function (value) { current = wrap(name, value); }
      });
    } catch (e) {
      adopt(name);
    }
  }

  // Inspection pass: runs once every classic script has evaluated, before the
  // library's load-time start.
  function inspect() {
    trap('setup');
    trap('draw');
  }
  if (document.readyState === 'loading') {
    document.addEventListener('DOMContentLoaded', inspect, { once: true });
  } else {
    inspect();
  }
})();"#;

pub(crate) const FOCUS_JS: &str = r#"window.addEventListener('load', function () {
  setTimeout(function () {
    var canvas = document.querySelector('canvas');
    var target = canvas || document.body;
    if (!target) { return; }
    if (canvas && !canvas.hasAttribute('tabindex')) { canvas.setAttribute('tabindex', '0'); }
    try { target.focus(); } catch (e) { /* not focusable */ }
    if (canvas) {
      try { canvas.dispatchEvent(new MouseEvent('click', { bubbles: true })); } catch (e) { /* ignore */ }
    }
  }, 0);
});"#;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShimConfig<'a> {
    source: &'a str,
    protocol_version: u32,
    run_id: String,
    max_frames: u64,
    line_offset: usize,
    enable_storage: bool,
}

/// Config literal for the shim. `<` is escaped so nothing inside the literal
/// can close the surrounding script element.
pub(crate) fn shim_config_json(
    run_id: RunId,
    max_frames: u64,
    line_offset: usize,
    enable_storage: bool,
) -> String {
    let config = ShimConfig {
        source: MESSAGE_SOURCE,
        protocol_version: PROTOCOL_VERSION,
        run_id: run_id.to_string(),
        max_frames,
        line_offset,
        enable_storage,
    };
    serde_json::to_string(&config)
        .unwrap_or_else(|_| "{}".to_string())
        .replace('<', "\\u003c")
}
