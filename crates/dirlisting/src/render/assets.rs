//! Built-in stylesheet and client-side sort script for the page layout.

/// Inline stylesheet used when no external stylesheet is configured.
pub const INLINE_STYLE: &str = concat!(
    "<style type=\"text/css\">\n",
    "a, a:active {text-decoration: none; color: blue;}\n",
    "a:visited {color: #48468F;}\n",
    "a:hover, a:focus {text-decoration: underline; color: red;}\n",
    "body {background-color: #F5F5F5;}\n",
    "h2 {margin-bottom: 12px;}\n",
    "table {margin-left: 12px;}\n",
    "th, td { font: 90% monospace; text-align: left;}\n",
    "th { font-weight: bold; padding-right: 14px; padding-bottom: 3px;}\n",
    "td {padding-right: 14px;}\n",
    "td.s, th.s {text-align: right;}\n",
    "div.list { background-color: white; border-top: 1px solid #646464;",
    " border-bottom: 1px solid #646464; padding-top: 10px; padding-bottom: 14px;}\n",
    "div.foot { font: 90% monospace; color: #787878; padding-top: 4px;}\n",
    "@media (prefers-color-scheme: dark) {\n",
    " a, a:active {color: #9E9EFF;}\n",
    " a:visited {color: #D0ADF0;}\n",
    " body, div.list {background-color: transparent;}\n",
    " div.foot {color: #878787;}\n",
    "}\n",
    "</style>\n",
    "<meta name=\"color-scheme\" content=\"light dark\">\n",
);

/// Column sorting for the listing table. Rows carry `data-value` attributes
/// so size and date columns sort on exact values.
const RESORT_JS: &str = r##"var click_column;
var name_column = 0;
var date_column = 1;
var size_column = 2;
var type_column = 3;
var prev_span = null;

if (typeof(String.prototype.localeCompare) === 'undefined') {
 String.prototype.localeCompare = function(str, locale, options) {
   return ((this == str) ? 0 : ((this > str) ? 1 : -1));
 };
}

if (typeof(String.prototype.toLocaleUpperCase) === 'undefined') {
 String.prototype.toLocaleUpperCase = function() {
  return this.toUpperCase();
 };
}

function get_inner_text(el) {
 if((typeof el == 'string')||(typeof el == 'undefined'))
  return el;
 if(el.dataset
    && (typeof el.dataset.value === 'string'
        || typeof el.dataset.value === 'number'))
  return el.dataset.value;
 if(el.innerText)
  return el.innerText;
 else {
  var str = "";
  var cs = el.childNodes;
  var l = cs.length;
  for (var i=0;i<l;i++) {
   if (cs[i].nodeType==1) str += get_inner_text(cs[i]);
   else if (cs[i].nodeType==3) str += cs[i].nodeValue;
  }
 }
 return str;
}

var date_regex=/(\d{4})-(\w{3})-(\d{2}) (\d{2}):(\d{2}):(\d{2})/;

var month_names = ['Jan','Feb','Mar','Apr','May','Jun',
                   'Jul','Aug','Sep','Oct','Nov','Dec'];

function month_num(mon) {
 var i; for (i = 0; i < 12 && mon != month_names[i]; ++i); return i;
}

function dates_to_data_values(table) {
 for (var j=1;j<table.rows.length;j++) {
  var el = table.rows[j].cells[date_column];
  if(el.dataset && typeof el.dataset.value != 'undefined') {
   if (typeof el.dataset.value == 'number')
    break;
   if (el.dataset.value === "-1")
    el.dataset.value = -1;
  } else {
   var d = date_regex.exec(get_inner_text(el));
   el.dataset.value = (parseInt(d[1])*(1<<26))
     + ( (month_num(d[2])<<22)
        |(parseInt(d[3])  <<17)
        |(parseInt(d[4])  <<12)
        |(parseInt(d[5])  << 6)
        |(parseInt(d[6])) );
  }
 }
}

function sortfn_then_by_name(a,b,sort_column) {
 if (sort_column == name_column || sort_column == type_column) {
  var ad = (a.cells[type_column].innerHTML === 'Directory');
  var bd = (b.cells[type_column].innerHTML === 'Directory');
  if (ad != bd) return (ad ? -1 : 1);
 }
 var at = get_inner_text(a.cells[sort_column]);
 var bt = get_inner_text(b.cells[sort_column]);
 var cmp;
 if (sort_column == size_column) {
  cmp = parseInt(at)-parseInt(bt);
 } else if (sort_column == date_column) {
  cmp = at-bt;
 } else {
  if (sort_column == name_column) {
   if (at == '../') return -1;
   if (bt == '../') return  1;
  }
  cmp = at.toLocaleUpperCase().localeCompare(bt.toLocaleUpperCase());
  if (0 != cmp) return cmp;
  cmp = at.localeCompare(bt);
 }
 if (0 != cmp || sort_column == name_column) return cmp;
 return sortfn_then_by_name(a,b,name_column);
}

function sortfn(a,b) {
 return sortfn_then_by_name(a,b,click_column);
}

function resort(lnk) {
 var span = lnk.childNodes[1];
 var table = lnk.parentNode.parentNode.parentNode.parentNode;
 click_column = lnk.parentNode.cellIndex;
 if (click_column == date_column) dates_to_data_values(table);
 var rows = new Array();
 for (var j=1;j<table.rows.length;j++)
  rows[j-1] = table.rows[j];
 rows.sort(sortfn);

 if (prev_span != null) prev_span.innerHTML = '';
 if (span.getAttribute('sortdir')=='down') {
  span.innerHTML = '&uarr;';
  span.setAttribute('sortdir','up');
  rows.reverse();
 } else {
  span.innerHTML = '&darr;';
  span.setAttribute('sortdir','down');
 }
 for (var i=0;i<rows.length;i++)
  table.tBodies[0].appendChild(rows[i]);
 prev_span = span;
}
"##;

/// Turns the header cells into sort links and applies `?C=N|M|S|T|D&O=A|D`.
const INIT_SORT_JS: &str = r##"
function init_sort(init_sort_column, descending) {
 var tables = document.getElementsByTagName("table");
 for (var i = 0; i < tables.length; i++) {
  var table = tables[i];
  var row = table.rows[0].cells;
  for (var j = 0; j < row.length; j++) {
   var n = row[j];
   if (n.childNodes.length == 1 && n.childNodes[0].nodeType == 3) {
    var link = document.createElement("a");
    var title = n.childNodes[0].nodeValue.replace(/:$/, "");
    link.appendChild(document.createTextNode(title));
    link.setAttribute("href", "#");
    link.setAttribute("class", "sortheader");
    link.setAttribute("onclick", "resort(this);return false;");
    var arrow = document.createElement("span");
    arrow.setAttribute("class", "sortarrow");
    arrow.appendChild(document.createTextNode(":"));
    link.appendChild(arrow)
    n.replaceChild(link, n.firstChild);
   }
  }
  var lnk = row[init_sort_column].firstChild;
  if (descending) {
   var span = lnk.childNodes[1];
   span.setAttribute('sortdir','down');
  }
  resort(lnk);
 }
}

function init_sort_from_query() {
  var urlParams = new URLSearchParams(location.search);
  var c = 0;
  var o = 0;
  switch (urlParams.get('C')) {
    case "N": c=0; break;
    case "M": c=1; break;
    case "S": c=2; break;
    case "T":
    case "D": c=3; break;
  }
  switch (urlParams.get('O')) {
    case "A": o=0; break;
    case "D": o=1; break;
  }
  init_sort(c,o);
}
init_sort_from_query();
"##;

/// Appends the inline sort script, wrapped in a `<script>` element.
pub fn append_resort_script(out: &mut Vec<u8>) {
    out.extend_from_slice(b"\n<script type=\"text/javascript\">\n// <!--\n\n");
    out.extend_from_slice(RESORT_JS.as_bytes());
    out.extend_from_slice(INIT_SORT_JS.as_bytes());
    out.extend_from_slice(b"\n// -->\n</script>\n\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resort_script_is_complete() {
        let mut out = Vec::new();
        append_resort_script(&mut out);
        let script = String::from_utf8(out).unwrap();
        assert!(script.contains("function resort(lnk)"));
        assert!(script.contains("setAttribute(\"href\", \"#\")"));
        assert!(script.contains("case \"D\": o=1; break;"));
        assert!(script.trim_end().ends_with("init_sort_from_query();\n\n// -->\n</script>"));
    }
}
